use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use ase_packer_core::{
    AsePackerError, PAGE_OPTIONS_FILE, PALETTES_DIR, PageInput, PageOptions, SpriteSource,
    TexturePage, pack_pages, read_palettes,
};
use clap::{ArgAction, Parser, Subcommand};
use globset::{Glob, GlobSet, GlobSetBuilder};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing::{error, info, warn};
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(
    name = "ase-packer",
    about = "Pack Aseprite sprites into texture atlases and back",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Show progress bars (disable with --progress false or --quiet)
    #[arg(long, default_value_t = true, action=ArgAction::Set, global=true, help_heading = "Logging/UX")]
    progress: bool,
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action=ArgAction::Count, global=true, help_heading = "Logging/UX")]
    verbose: u8,
    /// Quiet mode (overrides verbose)
    #[arg(
        short,
        long,
        default_value_t = false,
        global = true,
        help_heading = "Logging/UX"
    )]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pack every page directory under the input into `<page>.png` + `<page>.json`
    Pack(PackArgs),
    /// Regenerate sprite files from packed pages
    Unpack(UnpackArgs),
}

#[derive(Parser, Debug, Clone)]
struct PackArgs {
    // Input/Output
    /// Directory whose immediate subdirectories are pages
    #[arg(short, long, help_heading = "Input/Output")]
    input: PathBuf,
    /// Output directory
    #[arg(short, long, default_value = "out", help_heading = "Input/Output")]
    output: PathBuf,
    /// YAML or JSON config file with page option defaults
    #[arg(long, help_heading = "Input/Output")]
    config: Option<PathBuf>,
    /// Include patterns (glob). If set, only sources matching any pattern are considered
    #[arg(long, help_heading = "Input/Output")]
    include: Vec<String>,
    /// Exclude patterns (glob). Sources matching any pattern will be ignored
    #[arg(long, help_heading = "Input/Output")]
    exclude: Vec<String>,

    // Page
    /// Page texture side length
    #[arg(long, default_value_t = 2048, help_heading = "Page")]
    size: u32,
    /// Padding between packed images (edges are extruded when >= 2)
    #[arg(long, default_value_t = 2, help_heading = "Page")]
    padding: u32,

    // Export
    /// Print the merged page defaults (after CLI/config) and exit
    #[arg(long, default_value_t = false, help_heading = "Export")]
    print_config: bool,
    /// Output format for --print-config: json|yaml
    #[arg(long, default_value = "json", value_parser = ["json", "yaml"], help_heading = "Export")]
    print_config_format: String,
}

#[derive(Parser, Debug, Clone)]
struct UnpackArgs {
    /// Directory holding `<page>.png` + `<page>.json` pairs (and `palettes/` for indexed pages)
    #[arg(short, long)]
    input: PathBuf,
    /// Output directory; each page is recreated as `<output>/<page>/`
    #[arg(short, long, default_value = "unpacked")]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing_with_level(cli.quiet, cli.verbose);
    let show_progress = cli.progress && !cli.quiet;
    match &cli.command {
        Commands::Pack(args) => run_pack(args, show_progress),
        Commands::Unpack(args) => run_unpack(args, show_progress),
    }
}

fn run_pack(cli: &PackArgs, show_progress: bool) -> anyhow::Result<()> {
    let mut defaults = PageOptions::builder()
        .size(cli.size)
        .padding(cli.padding)
        .build();
    if let Some(path) = &cli.config {
        let file = fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let y: YamlConfig = serde_yaml::from_str(&file)
            .with_context(|| format!("parse config {}", path.display()))?;
        defaults = y.into_page_options(defaults);
    }
    defaults.validate()?;

    if cli.print_config {
        match cli.print_config_format.as_str() {
            "yaml" => println!("{}", serde_yaml::to_string(&defaults)?),
            _ => println!("{}", serde_json::to_string_pretty(&defaults)?),
        }
        return Ok(());
    }

    let include = build_globset(&cli.include)?;
    let exclude = build_globset(&cli.exclude)?;
    let page_dirs = list_page_dirs(&cli.input)?;
    info!(count = page_dirs.len(), input = %cli.input.display(), "pages found");

    let bar = progress_bar(page_dirs.len(), "loading", show_progress);
    let mut failed = 0usize;
    let mut inputs = Vec::with_capacity(page_dirs.len());
    for dir in &page_dirs {
        let name = file_name(dir);
        if let Some(b) = &bar {
            b.set_message(name.clone());
        }
        match load_page_input(dir, &name, &cli.input, &defaults, include.as_ref(), exclude.as_ref())
        {
            Ok(input) => inputs.push(input),
            Err(e) => {
                error!(page = %name, "page skipped: {e:#}");
                failed += 1;
            }
        }
        if let Some(b) = &bar {
            b.inc(1);
        }
    }
    if let Some(b) = &bar {
        b.finish_and_clear();
    }

    fs::create_dir_all(&cli.output)
        .with_context(|| format!("create output {}", cli.output.display()))?;
    let names: Vec<String> = inputs.iter().map(|i| i.name.clone()).collect();
    let t0 = Instant::now();
    for (name, result) in names.iter().zip(pack_pages(inputs)) {
        let saved = result
            .map_err(anyhow::Error::from)
            .and_then(|page| {
                page.save(&cli.output)
                    .with_context(|| format!("write page {} to {}", name, cli.output.display()))?;
                Ok(page.stats())
            });
        match saved {
            Ok(stats) => info!(page = %name, "{}", stats.summary()),
            Err(e) => {
                error!(page = %name, "page failed: {e:#}");
                failed += 1;
            }
        }
    }
    info!(elapsed_ms = t0.elapsed().as_millis() as u64, "packing done");

    if failed > 0 {
        anyhow::bail!("{failed} of {} pages failed", page_dirs.len());
    }
    Ok(())
}

fn run_unpack(cli: &UnpackArgs, show_progress: bool) -> anyhow::Result<()> {
    let mut pages: Vec<String> = Vec::new();
    for entry in
        fs::read_dir(&cli.input).with_context(|| format!("read {}", cli.input.display()))?
    {
        let path = entry?.path();
        let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
        if path.is_file() && is_json {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                pages.push(stem.to_string());
            }
        }
    }
    pages.sort();
    info!(count = pages.len(), input = %cli.input.display(), "pages found");

    fs::create_dir_all(&cli.output)
        .with_context(|| format!("create output {}", cli.output.display()))?;
    let palettes = cli.input.join(PALETTES_DIR);
    let bar = progress_bar(pages.len(), "unpacking", show_progress);
    let mut failed = 0usize;
    for name in &pages {
        if let Some(b) = &bar {
            b.set_message(name.clone());
        }
        match unpack_page(&cli.input, name, &palettes, &cli.output) {
            Ok(folder) => info!(page = %name, folder = %folder.display(), "page unpacked"),
            Err(e) => {
                error!(page = %name, "page failed: {e:#}");
                failed += 1;
            }
        }
        if let Some(b) = &bar {
            b.inc(1);
        }
    }
    if let Some(b) = &bar {
        b.finish_and_clear();
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} pages failed", pages.len());
    }
    Ok(())
}

fn unpack_page(input: &Path, name: &str, palettes: &Path, out: &Path) -> anyhow::Result<PathBuf> {
    let mut page = TexturePage::load(input, name)
        .with_context(|| format!("load page {name} from {}", input.display()))?;
    if page.options.pack_indexed {
        let count = page
            .load_palettes(palettes)
            .with_context(|| format!("read palettes from {}", palettes.display()))?;
        if count == 0 {
            warn!(page = %name, "indexed page has no palettes");
        }
    }
    page.write_to_folder(out)
        .with_context(|| format!("write page {name} to {}", out.display()))
}

/// Immediate subdirectories of `input`, sorted, minus the palette folder.
fn list_page_dirs(input: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(input).with_context(|| format!("read {}", input.display()))? {
        let path = entry?.path();
        if path.is_dir() && path.file_name().and_then(|n| n.to_str()) != Some(PALETTES_DIR) {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn load_page_input(
    dir: &Path,
    name: &str,
    input_root: &Path,
    defaults: &PageOptions,
    include: Option<&GlobSet>,
    exclude: Option<&GlobSet>,
) -> anyhow::Result<PageInput> {
    let options_path = dir.join(PAGE_OPTIONS_FILE);
    let options = if options_path.is_file() {
        let bytes = fs::read(&options_path)
            .with_context(|| format!("read {}", options_path.display()))?;
        serde_json::from_slice::<PageOptions>(&bytes)
            .with_context(|| format!("parse {}", options_path.display()))?
    } else {
        defaults.clone()
    };

    let mut sources = Vec::new();
    for path in gather_sources(dir, include, exclude) {
        let loaded = if path.is_dir() {
            SpriteSource::from_frame_dir(&path)
        } else {
            SpriteSource::read_ase(&path)
        };
        match loaded {
            Ok(source) => sources.push(source),
            Err(AsePackerError::MissingMetadata { path }) => {
                warn!(page = %name, source = %path.display(), "sprite skipped: no metadata");
            }
            Err(e) => {
                return Err(e).with_context(|| format!("load sprite {}", path.display()));
            }
        }
    }
    info!(page = %name, sprites = sources.len(), "sources loaded");

    let palettes = if options.pack_indexed {
        let dir = input_root.join(PALETTES_DIR);
        read_palettes(&dir, name).with_context(|| format!("read palettes from {}", dir.display()))?
    } else {
        Vec::new()
    };

    Ok(PageInput {
        name: name.to_string(),
        options,
        sources,
        palettes,
    })
}

/// Sprite files and frame directories in a page directory, sorted. The page directory itself
/// counts as a frame directory when it holds PNGs directly.
fn gather_sources(
    page_dir: &Path,
    include: Option<&GlobSet>,
    exclude: Option<&GlobSet>,
) -> Vec<PathBuf> {
    let mut list: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(page_dir).into_iter().filter_map(|e| e.ok()) {
        let p = entry.path();
        let wanted = if p.is_file() { is_sprite_file(p) } else { is_frame_dir(p) };
        if wanted && !should_skip(p, include, exclude) {
            list.push(p.to_path_buf());
        }
    }
    list.sort();
    list
}

fn build_globset(patterns: &[String]) -> anyhow::Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut b = GlobSetBuilder::new();
    for pat in patterns {
        b.add(Glob::new(pat).with_context(|| format!("bad glob {pat}"))?);
    }
    Ok(Some(b.build()?))
}

fn should_skip(p: &Path, include: Option<&GlobSet>, exclude: Option<&GlobSet>) -> bool {
    let s = p.to_string_lossy().replace('\\', "/");
    if let Some(ex) = exclude {
        if ex.is_match(&s) {
            return true;
        }
    }
    if let Some(inc) = include {
        if !inc.is_match(&s) {
            return true;
        }
    }
    false
}

fn is_sprite_file(p: &Path) -> bool {
    matches!(
        p.extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_ascii_lowercase()),
        Some(ext) if matches!(ext.as_str(), "ase" | "aseprite")
    )
}

/// A directory holding PNG frames directly.
fn is_frame_dir(p: &Path) -> bool {
    fs::read_dir(p)
        .map(|entries| {
            entries.filter_map(|e| e.ok()).any(|e| {
                let path = e.path();
                path.is_file() && path.extension().and_then(|x| x.to_str()) == Some("png")
            })
        })
        .unwrap_or(false)
}

fn file_name(p: &Path) -> String {
    p.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn progress_bar(len: usize, verb: &str, show: bool) -> Option<ProgressBar> {
    if !show {
        return None;
    }
    let b = ProgressBar::new(len as u64);
    let template = format!("{{spinner:.green}} {verb} {{pos}}/{{len}} [{{elapsed_precise}}] {{wide_msg}}");
    if let Ok(style) = ProgressStyle::with_template(&template) {
        b.set_style(style);
    }
    Some(b)
}

fn init_tracing_with_level(quiet: bool, verbose: u8) {
    let level = if quiet {
        "error".to_string()
    } else {
        match verbose {
            0 => "info".into(),
            1 => "debug".into(),
            _ => "trace".into(),
        }
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_target(false)
        .try_init();
}

/// Page defaults read from `--config`. Unset keys keep the CLI values.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct YamlConfig {
    size: Option<u32>,
    padding: Option<u32>,
    pack_indexed: Option<bool>,
    indexing_excluded_names: Option<Vec<String>>,
    indexing_equality_threshold: Option<u8>,
}

impl YamlConfig {
    fn into_page_options(self, mut opts: PageOptions) -> PageOptions {
        if let Some(v) = self.size {
            opts.size = v;
        }
        if let Some(v) = self.padding {
            opts.padding = v;
        }
        if let Some(v) = self.pack_indexed {
            opts.pack_indexed = v;
        }
        if let Some(v) = self.indexing_excluded_names {
            opts.indexing_excluded_names = v;
        }
        if let Some(v) = self.indexing_equality_threshold {
            opts.indexing_equality_threshold = v;
        }
        opts
    }
}
