//! Quire CLI - identify publication packages and read their entries.

use std::fs;
use std::io::Write;
use std::ops::Range;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing_subscriber::EnvFilter;

use quire::common::DEFAULT_READ_CEILING;
use quire::prelude::*;

/// Bytes per ranged read when an entry is too large to read whole.
const COPY_CHUNK: u64 = 4 * 1024 * 1024;

/// Quire - publication format sniffing and package reader
#[derive(Parser)]
#[command(name = "quire")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Identify the format of a file, directory or URL
    Sniff {
        /// Path or http(s) URL of the publication
        #[arg(env = "QUIRE_INPUT")]
        input: String,

        /// Declared media type, used as a hint
        #[arg(short, long)]
        media_type: Option<String>,

        /// File extension hint, without the dot
        #[arg(short, long)]
        extension: Option<String>,
    },

    /// List the entries of a package
    List {
        /// Path or http(s) URL of the publication
        #[arg(env = "QUIRE_INPUT")]
        input: String,

        /// Filter pattern (glob-style)
        #[arg(short, long)]
        filter: Option<String>,

        /// Show sizes next to each path
        #[arg(short, long)]
        detailed: bool,
    },

    /// Write one entry, or a byte range of it, to stdout
    Cat {
        /// Path or http(s) URL of the publication
        #[arg(env = "QUIRE_INPUT")]
        input: String,

        /// Entry path inside the package
        entry: String,

        /// First byte to read
        #[arg(long)]
        start: Option<u64>,

        /// End of the byte range (exclusive)
        #[arg(long)]
        end: Option<u64>,
    },

    /// Extract the entries of a package to a directory
    Extract {
        /// Path or http(s) URL of the publication
        #[arg(env = "QUIRE_INPUT")]
        input: String,

        /// Output directory
        #[arg(short, long, env = "QUIRE_OUTPUT")]
        output: PathBuf,

        /// Filter pattern (glob-style)
        #[arg(short, long)]
        filter: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let retriever = retriever()?;

    match cli.command {
        Commands::Sniff {
            input,
            media_type,
            extension,
        } => {
            let mut hints = FormatHints::new();
            if let Some(media_type) = media_type {
                hints = hints.with_media_type(&media_type);
            }
            if let Some(extension) = extension {
                hints = hints.with_file_extension(&extension);
            }
            cmd_sniff(&retriever, &input, hints)?;
        }
        Commands::List {
            input,
            filter,
            detailed,
        } => {
            cmd_list(&retriever, &input, filter.as_deref(), detailed)?;
        }
        Commands::Cat {
            input,
            entry,
            start,
            end,
        } => {
            cmd_cat(&retriever, &input, &entry, start, end)?;
        }
        Commands::Extract {
            input,
            output,
            filter,
        } => {
            cmd_extract(&retriever, &input, &output, filter.as_deref())?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(feature = "http")]
fn retriever() -> Result<AssetRetriever> {
    use std::sync::Arc;
    use std::time::Duration;

    let client = quire::resource::ReqwestClient::new(Duration::from_secs(30))
        .context("Failed to build HTTP client")?;
    Ok(AssetRetriever::standard().with_http_client(Arc::new(client)))
}

#[cfg(not(feature = "http"))]
fn retriever() -> Result<AssetRetriever> {
    Ok(AssetRetriever::standard())
}

fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

fn retrieve(retriever: &AssetRetriever, input: &str, hints: FormatHints) -> Result<Asset> {
    let start = Instant::now();
    let result = if is_url(input) {
        retriever.retrieve_url(input, hints)
    } else {
        retriever.retrieve_path(input, hints)
    };

    match result {
        Ok(asset) => {
            tracing::debug!(input, format = %asset.format(), elapsed = ?start.elapsed(), "retrieved");
            Ok(asset)
        }
        Err(SniffError::NotRecognized) => bail!("{input}: unsupported or corrupt publication"),
        Err(SniffError::Read(e)) if e.is_not_found() => bail!("{input}: not found"),
        Err(SniffError::Read(e)) => {
            Err(e).with_context(|| format!("{input}: unsupported or corrupt publication"))
        }
    }
}

fn open_container<'a>(asset: &'a Asset, input: &str) -> Result<&'a dyn Container> {
    match asset.container() {
        Some(container) => Ok(container),
        None => bail!("{input} is a single {} resource, not a package", asset.format()),
    }
}

fn cmd_sniff(retriever: &AssetRetriever, input: &str, hints: FormatHints) -> Result<()> {
    let asset = retrieve(retriever, input, hints)?;
    let registry = retriever.sniffer().sniffer().registry();

    let media_type = registry
        .media_type(asset.format())
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".to_string());
    match asset.container() {
        Some(container) => println!(
            "{}\t{}\tcontainer ({} entries)",
            asset.format(),
            media_type,
            container.entries().len()
        ),
        None => println!("{}\t{}\tresource", asset.format(), media_type),
    }

    asset.close();
    Ok(())
}

fn cmd_list(
    retriever: &AssetRetriever,
    input: &str,
    filter: Option<&str>,
    detailed: bool,
) -> Result<()> {
    let asset = retrieve(retriever, input, FormatHints::new())?;
    let container = open_container(&asset, input)?;
    let pattern = compile_filter(filter)?;

    let mut count = 0;
    for path in container.entries() {
        if !matches_filter(pattern.as_ref(), &path) {
            continue;
        }

        if detailed {
            let entry = container.get_exact(&path);
            let declared = entry.as_ref().and_then(|e| e.declared_length());
            let compressed = entry.as_ref().and_then(|e| e.compressed_length());
            println!(
                "{:>12} {:>12} {}",
                compressed.map_or_else(|| "-".to_string(), |n| n.to_string()),
                declared.map_or_else(|| "-".to_string(), |n| n.to_string()),
                path
            );
        } else {
            println!("{}", path);
        }
        count += 1;
    }

    println!("\nTotal: {} entries", count);

    asset.close();
    Ok(())
}

fn cmd_cat(
    retriever: &AssetRetriever,
    input: &str,
    entry_path: &str,
    start: Option<u64>,
    end: Option<u64>,
) -> Result<()> {
    let asset = retrieve(retriever, input, FormatHints::new())?;
    let container = open_container(&asset, input)?;

    let entry = container
        .get(entry_path)
        .with_context(|| format!("No entry {entry_path} in {input}"))?;

    let range = match (start, end) {
        (None, None) => None,
        (start, end) => Some(start.unwrap_or(0)..end.unwrap_or(u64::MAX)),
    };
    let mut stdout = std::io::stdout().lock();
    copy_entry(entry.as_ref(), range, DEFAULT_READ_CEILING, &mut stdout)
        .with_context(|| format!("Failed to read {entry_path}"))?;
    stdout.flush()?;

    asset.close();
    Ok(())
}

fn cmd_extract(
    retriever: &AssetRetriever,
    input: &str,
    output: &Path,
    filter: Option<&str>,
) -> Result<()> {
    println!("Opening publication: {}", input);

    let start = Instant::now();
    let asset = retrieve(retriever, input, FormatHints::new())?;
    let container = open_container(&asset, input)?;
    let pattern = compile_filter(filter)?;

    let paths: Vec<String> = container
        .entries()
        .into_iter()
        .filter(|path| matches_filter(pattern.as_ref(), path))
        .collect();

    println!(
        "Opened {} in {:?}, extracting {} entries...",
        asset.format(),
        start.elapsed(),
        paths.len()
    );

    let pb = ProgressBar::new(paths.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    fs::create_dir_all(output)?;

    let start = Instant::now();
    paths.par_iter().try_for_each(|path| -> Result<()> {
        let output_path = output_path(output, path)
            .with_context(|| format!("Refusing to extract {path} outside the output directory"))?;
        if let Some(parent) = output_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let entry = container
            .get_exact(path)
            .with_context(|| format!("Entry {path} disappeared"))?;
        let mut file = std::io::BufWriter::new(fs::File::create(&output_path)?);
        copy_entry(entry.as_ref(), None, DEFAULT_READ_CEILING, &mut file)
            .with_context(|| format!("Failed to read {path}"))?;
        file.flush()?;

        pb.inc(1);
        Ok(())
    })?;

    pb.finish_with_message("Done");
    println!("Extraction completed in {:?}", start.elapsed());

    asset.close();
    Ok(())
}

/// Write `range` of `entry`, or all of it, to `out`. Entries up to `ceiling`
/// are read whole so their checksum is verified; larger ones are copied in
/// ascending ranged reads.
fn copy_entry(
    entry: &dyn Entry,
    range: Option<Range<u64>>,
    ceiling: u64,
    out: &mut dyn Write,
) -> Result<u64> {
    let length = entry.length()?;
    let range = match range {
        None if length <= ceiling => {
            let data = entry.read(None)?;
            out.write_all(&data)?;
            return Ok(data.len() as u64);
        }
        None => 0..length,
        Some(range) => range.start..range.end.min(length),
    };

    let mut offset = range.start;
    while offset < range.end {
        let end = offset.saturating_add(COPY_CHUNK).min(range.end);
        let chunk = entry.read(Some(offset..end))?;
        if chunk.is_empty() {
            break;
        }
        out.write_all(&chunk)?;
        offset += chunk.len() as u64;
    }
    Ok(offset.saturating_sub(range.start))
}

/// Join an entry path under `output`, or `None` if it would escape it.
fn output_path(output: &Path, entry: &str) -> Option<PathBuf> {
    let mut path = output.to_path_buf();
    for component in Path::new(entry).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (path != output).then_some(path)
}

fn compile_filter(filter: Option<&str>) -> Result<Option<glob::Pattern>> {
    filter
        .map(|pattern| {
            glob::Pattern::new(pattern).with_context(|| format!("Invalid filter pattern {pattern}"))
        })
        .transpose()
}

fn matches_filter(pattern: Option<&glob::Pattern>, path: &str) -> bool {
    let options = glob::MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    pattern.map_or(true, |p| p.matches_with(path, options))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_stays_inside() {
        let out = Path::new("/tmp/out");
        assert_eq!(
            output_path(out, "OEBPS/ch1.xhtml"),
            Some(PathBuf::from("/tmp/out/OEBPS/ch1.xhtml"))
        );
        assert_eq!(output_path(out, "../etc/passwd"), None);
        assert_eq!(output_path(out, "/abs/path"), None);
        assert_eq!(output_path(out, ""), None);
    }

    #[test]
    fn test_filter_is_case_insensitive() {
        let pattern = compile_filter(Some("*.XHTML")).unwrap();
        assert!(matches_filter(pattern.as_ref(), "OEBPS/ch1.xhtml"));
        assert!(!matches_filter(pattern.as_ref(), "OEBPS/style.css"));
        assert!(matches_filter(None, "anything"));
    }

    struct BlobEntry(quire::common::MemoryBlob);

    impl Readable for BlobEntry {
        fn length(&self) -> Result<u64, ReadError> {
            self.0.length()
        }

        fn read(&self, range: Option<Range<u64>>) -> Result<Vec<u8>, ReadError> {
            if range.is_none() && self.0.length()? > 8 {
                return Err(ReadError::OutOfMemory {
                    requested: self.0.length()?,
                    limit: 8,
                });
            }
            self.0.read(range)
        }

        fn close(&self) {}
    }

    impl Entry for BlobEntry {
        fn path(&self) -> &str {
            "blob"
        }

        fn declared_length(&self) -> Option<u64> {
            self.0.length().ok()
        }
    }

    #[test]
    fn test_copy_entry_falls_back_to_ranged_reads() {
        let entry = BlobEntry(quire::common::MemoryBlob::from(b"0123456789".to_vec()));

        let mut out = Vec::new();
        assert_eq!(copy_entry(&entry, None, 8, &mut out).unwrap(), 10);
        assert_eq!(out, b"0123456789");

        let mut out = Vec::new();
        assert_eq!(copy_entry(&entry, Some(4..100), 8, &mut out).unwrap(), 6);
        assert_eq!(out, b"456789");

        let mut out = Vec::new();
        assert!(copy_entry(&entry, None, 64, &mut out).is_err());
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.org/book.epub"));
        assert!(!is_url("book.epub"));
    }

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["quire", "-v", "cat", "book.epub", "mimetype", "--end", "8"])
            .unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Cat { end: Some(8), start: None, .. }
        ));
    }
}
