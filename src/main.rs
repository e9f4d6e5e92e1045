use clap::Parser;
use sitepipe::layout::Layout;
use sitepipe::tasks::{self, Pipeline, PipelineEvent, TaskId, TaskRegistry};
use sitepipe::{config, output, serve, watch};
use std::path::PathBuf;
use std::sync::{Arc, mpsc};
use std::thread;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "sitepipe")]
#[command(about = "Static site asset pipeline: templates, styles, scripts, images")]
#[command(long_about = "\
Static site asset pipeline: templates, styles, scripts, images

Compiles a source tree into a preview site (dist/) and a publishable
release (public/). Runs `serve` when no task is given.

Project layout:

  site.toml                        # Site config (optional)
  pages.csv                        # path,title rows for scaffold-pages
  src/
  ├── templates/
  │   ├── pages/                   # One page per .html (_partials skipped)
  │   └── lib/_template.html       # Blank page for scaffold-pages
  ├── styles/style.scss            # Style entry (glob @imports allowed)
  ├── scripts/entry.js             # Script entry
  ├── images/                      # Copied to dist/imgs, optimized to public/imgs
  └── favicon.png                  # Favicon source
  dist/                            # Preview output
  public/                          # Release output

Tasks:

  build             template-compile + style-compile + script-bundle + static-image-copy
  watch             build, then rebuild on change
  serve             watch, plus a live-reloading preview server on dist/
  release           build + image-optimize + favicon-generate, then publish to public/
  pre-release       build, then copy dist/ to public/ as-is

Run 'sitepipe --gen-config' to generate a documented site.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Task to run
    #[arg(value_enum)]
    task: Option<TaskId>,

    /// Project root
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Disable the optimization cache and re-encode all images
    #[arg(long)]
    no_cache: bool,

    /// Preview server port (overrides [server].port)
    #[arg(long)]
    port: Option<u16>,

    /// Don't open a browser when serving
    #[arg(long)]
    no_open: bool,

    /// Print a stock site.toml with all options documented
    #[arg(long)]
    gen_config: bool,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.gen_config {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let root = std::fs::canonicalize(&cli.root)
        .map_err(|e| format!("{}: {e}", cli.root.display()))?;
    let site_config = config::load_config(&root)?;
    let registry = tasks::registry()?;
    let target = cli
        .task
        .or(registry.default_task())
        .unwrap_or(TaskId::Serve);

    let (tx, rx) = mpsc::channel();
    let printer_root = root.clone();
    let printer = thread::spawn(move || {
        for event in rx {
            output::print_event(&event, &printer_root);
        }
    });

    let pipeline = Pipeline::new(Layout::new(&root), site_config, target)
        .with_events(tx)
        .with_no_cache(cli.no_cache);
    let result = execute(&cli, &pipeline, &registry, target);
    // Closing the channel lets the printer finish.
    drop(pipeline);
    printer.join().ok();
    result
}

fn execute(
    cli: &Cli,
    pipeline: &Pipeline,
    registry: &TaskRegistry,
    target: TaskId,
) -> Result<(), Box<dyn std::error::Error>> {
    pipeline.run(registry, target)?;

    match target {
        TaskId::Watch => {
            watch::Coordinator::new(pipeline, registry, None).watch()?;
        }
        TaskId::Serve => {
            let reload = Arc::new(serve::LiveReload::default());
            let port = cli.port.unwrap_or(pipeline.config.server.port);
            let server =
                serve::PreviewServer::start(pipeline.layout.dist(), port, Arc::clone(&reload))?;
            pipeline.emit(PipelineEvent::Serving { url: server.url() });
            if pipeline.config.server.open && !cli.no_open {
                if let Err(e) = serve::open_browser(&server.url()) {
                    eprintln!("warning: could not open a browser: {e}");
                }
            }
            watch::Coordinator::new(pipeline, registry, Some(reload.as_ref())).watch()?;
        }
        _ => {}
    }
    Ok(())
}
