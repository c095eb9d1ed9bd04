use std::{path::{Path, PathBuf}, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser as ClapParser;
use chtml::{component::{render_fragment, Component},
            config::Config,
            error::error_records,
            expr::ExprEvaluator,
            interp::output_string,
            loader::{FsSources, Loader},
            router::{FsListing, RouteMatch, Router},
            scope::Scope,
            serve::serve,
            value::{Value, Vars}};


#[derive(clap::Parser, Debug)]
/// Render and serve CHTML component templates.
struct Args {
    /// JSON config file (search_path, listen, trace, verbose); the
    /// CHTML_* env vars override it.
    #[clap(long)]
    config: Option<PathBuf>,

    /// Log loading and requests.
    #[clap(short, long)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Render a file and print the result.
    Render {
        file: PathBuf,
        /// Variables as a JSON object.
        #[clap(long)]
        vars: Option<String>,
        /// Only output the element with this id.
        #[clap(long)]
        fragment: Option<String>,
        /// Directory to search components in, after the file's own
        /// directory (can be given multiple times).
        #[clap(long)]
        search_path: Vec<PathBuf>,
    },
    /// Show what a URL path resolves to below ROOT.
    Route {
        root: PathBuf,
        path: String,
    },
    /// Parse files and verify that all imported components exist.
    Check {
        #[clap(required(true))]
        files: Vec<PathBuf>,
    },
    /// Serve the site in ROOT.
    Serve {
        root: PathBuf,
        #[clap(long)]
        listen: Option<String>,
    },
}

fn parse_vars(json: &str) -> Result<Vars> {
    let j: serde_json::Value = serde_json::from_str(json)
        .with_context(|| anyhow!("parsing --vars"))?;
    match Value::from_json(j) {
        Value::Object(vars) => Ok(vars),
        v => bail!("--vars: expecting a JSON object, got {}", v.type_name()),
    }
}

fn print_error(err: &anyhow::Error) {
    eprintln!("Error: {err:#}");
    for record in error_records(err) {
        for frame in &record.stack {
            eprintln!("  in {frame}");
            for line in &frame.source {
                let marker = if line.line == frame.line { ">" } else { " " };
                eprintln!("  {:>5}{marker} {}", line.line, line.text);
            }
        }
    }
}

fn render(config: &Config, file: &Path, vars: Vars, fragment: Option<&str>) -> Result<()> {
    let loader = Loader::new(Arc::new(FsSources),
                             config.search_path.clone(),
                             Arc::new(ExprEvaluator::new()));
    let name = file.file_stem().map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string_lossy().into_owned());
    let component = loader.load_path(&name, file)?;
    let scope = Scope::root(vars);
    let result = match fragment {
        Some(id) => render_fragment(&*component, &scope, id),
        None => component.render(&scope),
    };
    scope.notifier().close();
    component.dispose()?;
    println!("{}", output_string(&result?)?);
    Ok(())
}

fn route(root: &Path, path: &str) -> Result<()> {
    let router = Router::new(FsListing::new(root));
    match router.route(path)? {
        Some(RouteMatch::Component { path, params }) => {
            println!("component {}", path.display());
            for (k, v) in params {
                println!("  {k} = {v:?}");
            }
        }
        Some(RouteMatch::Static(path)) => println!("static {}", path.display()),
        None => bail!("no route for {path:?}"),
    }
    Ok(())
}

fn check(config: &Config, files: &[PathBuf]) -> Result<()> {
    let loader = Loader::new(Arc::new(FsSources),
                             config.search_path.clone(),
                             Arc::new(ExprEvaluator::new()));
    let mut failed = 0;
    for file in files {
        if let Err(e) = loader.check_path(file) {
            print_error(&e);
            failed += 1;
        }
    }
    if failed > 0 {
        bail!("{failed} of {} files failed", files.len())
    }
    Ok(())
}

fn run(args: Args) -> Result<()> {
    let mut config = Config::load(args.config.as_deref())?;
    config.verbose |= args.verbose;
    config.install_logging();
    match args.command {
        Command::Render { file, vars, fragment, search_path } => {
            if !search_path.is_empty() {
                config.search_path = search_path;
            }
            let vars = match vars {
                Some(json) => parse_vars(&json)?,
                None => Vars::new(),
            };
            render(&config, &file, vars, fragment.as_deref())
        }
        Command::Route { root, path } => route(&root, &path),
        Command::Check { files } => check(&config, &files),
        Command::Serve { root, listen } => {
            if let Some(listen) = listen {
                config.listen = listen;
            }
            serve(&root, &config)
        }
    }
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        print_error(&e);
        std::process::exit(1);
    }
}
