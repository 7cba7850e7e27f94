mod op_spec;

use anyhow::{bail, Context, Result};
use app_settings::AppSettings;
use clap::{Args, Parser, Subcommand};
use engine::{list_macros, sidecar, Editor, Operation};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "zenithedit", about = "Non-destructive image editing", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open an image, apply edits and save or export the result.
    Edit(EditArgs),
    /// Print the edit history stored next to an image.
    History { image: PathBuf },
    /// List the macro library.
    Macros { dir: Option<PathBuf> },
}

#[derive(Args)]
struct EditArgs {
    image: PathBuf,

    /// Operation to apply, e.g. `crop:0,0,64,64` or `flip:h`. Repeatable.
    #[arg(long = "op", value_parser = op_spec::parse_op)]
    ops: Vec<Operation>,

    /// Macro file to replay after the operations. Repeatable.
    #[arg(long = "macro")]
    macros: Vec<PathBuf>,

    /// Undo this many operations before saving.
    #[arg(long, default_value_t = 0)]
    undo: usize,

    /// Record this session's edits into a macro file.
    #[arg(long, requires = "name")]
    record: Option<PathBuf>,

    #[arg(long)]
    name: Option<String>,

    /// Render the edited image to this path.
    #[arg(short, long, conflicts_with = "save")]
    output: Option<PathBuf>,

    /// Write the history sidecar next to the source image.
    #[arg(long)]
    save: bool,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("zenithedit=info,engine=info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut settings = AppSettings::load().unwrap_or_else(|err| {
        warn!("using default settings: {err}");
        AppSettings::default()
    });

    match cli.command {
        Commands::Edit(args) => {
            let outcome = run_edit(args, &mut settings);
            if let Err(err) = settings.save() {
                warn!("failed to save settings: {err}");
            }
            outcome
        }
        Commands::History { image } => {
            print_history(&image);
            Ok(())
        }
        Commands::Macros { dir } => {
            let dir = match dir {
                Some(dir) => dir,
                None => settings.macro_dir()?,
            };
            print_macros(&dir)
        }
    }
}

fn run_edit(args: EditArgs, settings: &mut AppSettings) -> Result<()> {
    let mut editor = Editor::new();
    editor
        .open(&args.image)
        .with_context(|| format!("opening {}", args.image.display()))?;
    settings.set_last_image(args.image.clone());

    if args.record.is_some() {
        editor.start_recording()?;
    }

    for op in args.ops {
        let description = op.describe();
        editor.update_preview(op, true)?;
        editor.wait_preview();
        editor
            .apply_preview()
            .with_context(|| format!("applying {description}"))?;
        println!("applied: {description}");
    }

    for path in &args.macros {
        let complete = editor
            .apply_macro_file(path)
            .with_context(|| format!("reading macro {}", path.display()))?;
        if !complete {
            bail!("macro {} did not apply cleanly", path.display());
        }
        println!("replayed: {}", path.display());
    }

    for _ in 0..args.undo {
        if !editor.undo() {
            break;
        }
    }

    if let Some(path) = args.record {
        let name = args.name.unwrap_or_default();
        match editor.stop_recording(name) {
            Some(recorded) => {
                let written = recorded.save(&path)?;
                settings.record_macro(&written);
                println!("recorded {} operation(s) to {}", recorded.operations.len(), written.display());
            }
            None => warn!("nothing recorded; {} not written", path.display()),
        }
    }

    if let Some(output) = &args.output {
        editor.export(output)?;
        println!("exported {}", output.display());
    } else if args.save {
        editor.save()?;
        println!("saved history for {}", args.image.display());
    } else if editor.is_modified() {
        info!("edits not saved; pass --save or --output to keep them");
    }

    let image = editor.image()?;
    println!("history ({} applied, {} undone):", image.applied().len(), image.undone().len());
    for (idx, description) in image.history().iter().enumerate() {
        println!("  {:>3}. {description}", idx + 1);
    }
    Ok(())
}

fn print_history(image: &Path) {
    let ops = sidecar::read_history(image);
    if ops.is_empty() {
        println!("{}: no saved edits", image.display());
        return;
    }
    println!("{}:", image.display());
    for (idx, op) in ops.iter().enumerate() {
        println!("  {:>3}. {}", idx + 1, op.describe());
    }
}

fn print_macros(dir: &Path) -> Result<()> {
    let entries = list_macros(dir)?;
    if entries.is_empty() {
        println!("no macros in {}", dir.display());
        return Ok(());
    }
    for entry in entries {
        println!(
            "{:<30} {:>3} op(s)  {}",
            entry.name,
            entry.operations,
            entry.path.display()
        );
    }
    Ok(())
}
