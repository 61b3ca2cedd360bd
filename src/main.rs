use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{CommandFactory, Parser};

use docx_restyle::config::init_default_config;
use docx_restyle::error::classify;
use docx_restyle::pipeline::{
    bundle_outputs, inspect_template, run_batch, FileError, MergeConfig, MergeOverrides,
    TargetInput,
};
use docx_restyle::progress::ConsoleProgress;

#[derive(Parser, Debug)]
#[command(name = "docx-restyle")]
#[command(about = "Apply a template's headers, footers, styles and fonts to Word documents", long_about = None)]
struct Args {
    /// Generate a default config file, then exit
    #[arg(long)]
    init_config: bool,

    /// Directory to write the config file to (default: current directory)
    #[arg(long, value_name = "DIR")]
    init_config_dir: Option<PathBuf>,

    /// Overwrite an existing config file when used with --init-config
    #[arg(long)]
    force: bool,

    /// Template .docx whose formatting is applied
    #[arg(long, value_name = "DOCX")]
    template: Option<PathBuf>,

    /// Target .docx files to update
    #[arg(value_name = "TARGET")]
    targets: Vec<PathBuf>,

    /// Output directory (default: next to each input)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Also pack every output into one ZIP archive
    #[arg(long, value_name = "ZIP")]
    bundle: Option<PathBuf>,

    /// Config file path (default: search for docx-restyle.toml upwards)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log every merge step
    #[arg(long)]
    debug: bool,

    /// Insert a PROCESS FLOW CHART section before the numbered PROCEDURE heading
    #[arg(long)]
    insert_flow_chart: bool,

    /// Keep the target's fonts (ignored when --font is given)
    #[arg(long)]
    preserve_target_fonts: bool,

    /// Force this font everywhere instead of the template's default font
    #[arg(long, value_name = "NAME")]
    font: Option<String>,

    /// Leave the template's title placeholder untouched
    #[arg(long)]
    no_extract_title: bool,

    /// Print the template's header/footer summary as JSON
    #[arg(long)]
    inspect_template: bool,

    /// Write the batch summary as JSON
    #[arg(long, value_name = "JSON")]
    summary_json: Option<PathBuf>,

    /// Suppress the step log; failures are still listed at the end
    #[arg(long)]
    quiet: bool,
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.init_config {
        let dir = args
            .init_config_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        let cfg_path = init_default_config(&dir, args.force).context("init default config")?;
        eprintln!("Wrote config: {}", cfg_path.display());
        return Ok(());
    }

    let template_path = match args.template {
        Some(p) => p,
        None => {
            let mut cmd = Args::command();
            cmd.print_help().context("print help")?;
            eprintln!(
                "\n\nUSAGE:\n  docx-restyle --template template.docx report1.docx report2.docx\n\nTIPS:\n  - Outputs are written as <name>_updated.docx next to each input, or into -o DIR.\n  - Default config search: docx-restyle.toml (upwards), or set DOCX_RESTYLE_CONFIG.\n"
            );
            anyhow::bail!("missing --template");
        }
    };

    let overrides = MergeOverrides {
        debug: args.debug,
        insert_flow_chart: args.insert_flow_chart,
        preserve_target_fonts: args.preserve_target_fonts,
        font: args.font.clone(),
        no_extract_title: args.no_extract_title,
    };
    let (cfg, cfg_file) = MergeConfig::resolve(args.config, &parent_dir(&template_path), &overrides)
        .context("build config")?;
    let progress = ConsoleProgress::new(!args.quiet).with_debug(cfg.debug_mode);
    if let Some(p) = &cfg_file {
        progress.debug(format!("config: {}", p.display()));
    }

    let template_bytes = std::fs::read(&template_path)
        .with_context(|| format!("read template: {}", template_path.display()))?;
    let summary = inspect_template(&template_bytes, &progress)
        .with_context(|| format!("load template: {}", template_path.display()))?;
    if args.inspect_template {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("serialize template summary")?
        );
        if args.targets.is_empty() {
            return Ok(());
        }
    }

    let mut inputs = Vec::with_capacity(args.targets.len());
    let mut dirs: HashMap<String, PathBuf> = HashMap::new();
    let mut read_errors = Vec::new();
    for path in &args.targets {
        match TargetInput::read(path) {
            Ok(input) => {
                dirs.entry(input.name.clone()).or_insert_with(|| parent_dir(path));
                inputs.push(input);
            }
            Err(e) => {
                progress.error(format!("{e:#}"));
                read_errors.push(FileError {
                    file: path.display().to_string(),
                    kind: classify(&e),
                    message: format!("{e:#}"),
                });
            }
        }
    }

    let mut batch = run_batch(&template_bytes, &inputs, &cfg, &progress);
    batch.attempted += read_errors.len();
    batch.errors.extend(read_errors);

    if let Some(dir) = &args.output {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create output dir: {}", dir.display()))?;
    }
    for out in &batch.outputs {
        let dir = match &args.output {
            Some(d) => d.clone(),
            None => dirs
                .get(&out.source_name)
                .cloned()
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        let path = dir.join(&out.output_name);
        std::fs::write(&path, &out.bytes)
            .with_context(|| format!("write output: {}", path.display()))?;
        progress.info(format!("Wrote {}", path.display()));
    }

    if let Some(zip_path) = &args.bundle {
        if batch.outputs.is_empty() {
            progress.warn("No processed files to bundle");
        } else {
            let bytes = bundle_outputs(&batch.outputs).context("bundle outputs")?;
            std::fs::write(zip_path, bytes)
                .with_context(|| format!("write bundle: {}", zip_path.display()))?;
            progress.success(format!(
                "Bundled {} files into {}",
                batch.outputs.len(),
                zip_path.display()
            ));
        }
    }

    if let Some(json_path) = &args.summary_json {
        let json = serde_json::to_string_pretty(&batch).context("serialize batch summary")?;
        std::fs::write(json_path, json)
            .with_context(|| format!("write summary: {}", json_path.display()))?;
    }

    if args.quiet {
        for err in &batch.errors {
            eprintln!("{}: {}", err.file, err.message);
        }
    }
    eprintln!("{}", batch.summary());
    if batch.attempted > 0 && batch.outputs.is_empty() {
        anyhow::bail!("no target document was processed successfully");
    }
    Ok(())
}
