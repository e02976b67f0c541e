// CLI command implementations
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use sonde::{AnalyzeOptions, MediaFile, MetadataRecord, VorbisComment};

use crate::cli::config::{parse_assignment, parse_fields, Commands, Config};
use crate::cli::output::{OutputFormatter, ProgressBar};

/// Run the parsed command line
pub fn run(config: Config) -> Result<()> {
    let options = load_options(&config)?;
    let formatter = OutputFormatter::new(config.format, config.quiet);

    match config.command {
        Commands::Read { files, fields, output } => command_read(&files, fields.as_deref(), output, &options, &formatter),
        Commands::Detect { files } => command_detect(&files, &formatter),
        Commands::Info { files, detailed } => command_info(&files, detailed, &options, &formatter),
        Commands::ExportCover { file, output } => command_export_cover(&file, &output, &options, &formatter),
        Commands::Write { file, set, remove, clear } => command_write(&file, &set, &remove, clear, &formatter),
        Commands::Batch { directory, pattern } => command_batch(&directory, &pattern, &options, &formatter),
    }
}

fn load_options(config: &Config) -> Result<AnalyzeOptions> {
    let mut options = match &config.config {
        Some(path) => AnalyzeOptions::from_json_file(path)
            .with_context(|| format!("Failed to load options from {}", path.display()))?,
        None => AnalyzeOptions::default(),
    };
    if config.no_crc {
        options.verify_page_checksums = false;
    }
    debug!(?options, "analysis options");
    Ok(options)
}

fn open(path: &Path, options: &AnalyzeOptions) -> Result<MediaFile> {
    let file = MediaFile::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    Ok(file.with_options(options.clone()))
}

/// Serialize a record, keeping only the requested top-level fields
fn record_value(record: &MetadataRecord, fields: Option<&[String]>) -> Result<Value> {
    let value = serde_json::to_value(record)?;
    let Some(fields) = fields else {
        return Ok(value);
    };
    let Value::Object(map) = value else {
        return Ok(value);
    };
    Ok(Value::Object(
        map.into_iter().filter(|(key, _)| fields.iter().any(|f| f == key)).collect(),
    ))
}

/// Print the metadata record of each file
fn command_read(
    files: &[PathBuf],
    fields: Option<&str>,
    output: Option<PathBuf>,
    options: &AnalyzeOptions,
    formatter: &OutputFormatter,
) -> Result<()> {
    let fields = fields.map(parse_fields);

    let mut writer: Box<dyn Write> = match &output {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(io::stdout()),
    };

    for path in files {
        let record = match open(path, options).and_then(|file| Ok(file.analyze()?)) {
            Ok(record) => record,
            Err(e) => {
                formatter.print_error(&format!("{}: {:#}", path.display(), e));
                continue;
            }
        };
        let mut value = record_value(&record, fields.as_deref())?;
        if files.len() > 1 {
            if let Value::Object(map) = &mut value {
                map.insert("filename".to_string(), Value::String(path.display().to_string()));
            }
        }
        formatter.output_value(&value, &mut writer)?;
    }
    writer.flush()?;

    if let Some(path) = output {
        formatter.print_success(&format!("Wrote {}", path.display()));
    }
    Ok(())
}

/// Identify each file by signature
fn command_detect(files: &[PathBuf], formatter: &OutputFormatter) -> Result<()> {
    for path in files {
        let detected = MediaFile::open(path).and_then(|file| file.detect());
        match detected {
            Ok(Some(kind)) => println!("{}: {}", path.display(), kind),
            Ok(None) => formatter.print_error(&format!("{}: unknown format", path.display())),
            Err(e) => formatter.print_error(&format!("{}: {}", path.display(), e)),
        }
    }
    Ok(())
}

/// Audio summary plus diagnostics
fn command_info(files: &[PathBuf], detailed: bool, options: &AnalyzeOptions, formatter: &OutputFormatter) -> Result<()> {
    for path in files {
        let record = open(path, options)?.analyze()?;
        println!("{}", path.display());

        let format = record.format.map(|kind| kind.to_string()).unwrap_or_else(|| "unknown".to_string());
        println!("  Format:      {}", format);
        if let Some(codec) = &record.audio.dataformat {
            println!("  Codec:       {}", codec);
        }
        if let Some(encoder) = record.vendor() {
            println!("  Encoder:     {}", encoder);
        }
        if let Some(rate) = record.audio.sample_rate {
            println!("  Sample rate: {} Hz", rate);
        }
        if let Some(channels) = record.audio.channels {
            println!("  Channels:    {}", channels);
        }
        if let Some(bits) = record.audio.bits_per_sample {
            println!("  Bit depth:   {}", bits);
        }
        if let Some(bitrate) = record.bitrate {
            println!("  Bitrate:     {:.0} kbps", bitrate / 1000.0);
        }
        if let Some(playtime) = &record.playtime_string {
            println!("  Duration:    {}", playtime);
        }
        println!("  Data region: {}..{}", record.avdataoffset, record.avdataend);

        for (key, values) in &record.comments {
            println!("  {}: {}", key, values.join("; "));
        }

        if detailed {
            if let Some(ogg) = &record.ogg {
                for page in &ogg.page_headers {
                    println!(
                        "  page {:>6} @ {:<10} granule {:<12} {} bytes",
                        page.sequence, page.offset, page.granule_position, page.payload_len
                    );
                }
            }
            if let Some(flac) = &record.flac {
                for block in &flac.blocks {
                    println!(
                        "  block {:<14} @ {:<10} {} bytes{}",
                        block.block_type.name(),
                        block.offset,
                        block.length,
                        if block.is_last { " (last)" } else { "" }
                    );
                }
            }
        }

        for error in &record.errors {
            formatter.print_error(&error.to_string());
        }
        for warning in &record.warnings {
            formatter.print_info(&format!("warning: {}", warning));
        }
    }
    Ok(())
}

fn command_export_cover(file: &Path, output: &Path, options: &AnalyzeOptions, formatter: &OutputFormatter) -> Result<()> {
    let Some(picture) = open(file, options)?.extract_cover()? else {
        bail!("No cover art found in {}", file.display());
    };

    fs::create_dir_all(output).with_context(|| format!("Failed to create {}", output.display()))?;
    let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or("cover");
    let target = output.join(format!("{}.{}", stem, picture.get_extension()));
    fs::write(&target, &picture.data).with_context(|| format!("Failed to write {}", target.display()))?;

    formatter.print_success(&format!(
        "Exported {} ({}, {} bytes) to {}",
        picture.picture_type.description(),
        picture.mime_type,
        picture.data.len(),
        target.display()
    ));
    Ok(())
}

fn command_write(file: &Path, set: &[String], remove: &[String], clear: bool, formatter: &OutputFormatter) -> Result<()> {
    let media = MediaFile::open(file).with_context(|| format!("Failed to open {}", file.display()))?;
    let current = media.read_comment()?;

    let mut comment = match current {
        Some(comment) if !clear => comment,
        Some(comment) => VorbisComment::new(comment.vendor_string),
        None => VorbisComment::new(concat!("sonde ", env!("CARGO_PKG_VERSION"))),
    };

    for key in remove {
        comment.remove(key);
    }
    for raw in set {
        let Some((key, value)) = parse_assignment(raw) else {
            bail!("Invalid assignment '{}', expected KEY=VALUE", raw);
        };
        comment.set(key, value);
    }

    info!(path = %file.display(), fields = comment.comments.len(), "writing vorbis comment");
    media
        .write_comments(&comment)
        .with_context(|| format!("Failed to update {}", file.display()))?;
    formatter.print_success(&format!("Updated metadata for {}", file.display()));
    Ok(())
}

/// Analyze every file under `directory` that matches `pattern`
fn command_batch(directory: &Path, pattern: &str, options: &AnalyzeOptions, formatter: &OutputFormatter) -> Result<()> {
    let base = directory.display();
    let glob_pattern = if pattern.contains('*') || pattern.contains('?') {
        format!("{}/**/{}", base, pattern)
    } else {
        format!("{}/**/*{}", base, pattern)
    };

    let mut files = Vec::new();
    for entry in glob::glob(&glob_pattern).with_context(|| format!("Invalid glob pattern: {}", glob_pattern))? {
        let path = entry?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    if files.is_empty() {
        formatter.print_info(&format!("No files match {}", glob_pattern));
        return Ok(());
    }

    let mut progress = ProgressBar::new(files.len(), !formatter.quiet());
    let mut failed = 0usize;
    let stdout = io::stdout();
    let mut writer = stdout.lock();

    for path in &files {
        let record = open(path, options)?.analyze()?;
        if !record.is_ok() {
            failed += 1;
        }
        let mut value = record_value(&record, None)?;
        if let Value::Object(map) = &mut value {
            map.insert("filename".to_string(), Value::String(path.display().to_string()));
        }
        formatter.output_value(&value, &mut writer)?;
        progress.increment();
    }

    formatter.print_success(&format!("Analyzed {} files, {} with errors", files.len(), failed));
    Ok(())
}
