use clap::{Args, Parser, Subcommand};
use std::io::Read;
use std::path::Path;

use haml_codegen::{BlockStatement, Format, Options, Value};
use haml_render::{EvalError, Evaluator, Renderer};

#[derive(Parser)]
#[command(name = "haml")]
#[command(about = "Haml template compiler")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check a template for errors without generating output
    Check {
        /// Input .haml file, or `-` for stdin
        path: String,
        #[command(flatten)]
        options: OptionArgs,
    },

    /// Compile a template and print its operation program
    Compile {
        /// Input .haml file, or `-` for stdin
        path: String,
        #[command(flatten)]
        options: OptionArgs,
    },

    /// Render a template with every expression compiled away
    Render {
        /// Input .haml file, or `-` for stdin
        path: String,
        #[command(flatten)]
        options: OptionArgs,
    },

    /// List the built-in filters
    Filters,
}

#[derive(Args)]
struct OptionArgs {
    /// JSON options file; flags given on the command line override it
    #[arg(long)]
    config: Option<String>,

    /// Output format: xhtml, html4 or html5
    #[arg(long)]
    format: Option<Format>,

    /// Escape `=` output by default
    #[arg(long)]
    escape_html: bool,

    /// Drop every expression at compile time
    #[arg(long)]
    suppress_eval: bool,

    /// Quote character around attribute values
    #[arg(long)]
    attr_wrapper: Option<char>,
}

impl OptionArgs {
    fn resolve(&self) -> Options {
        let mut options = match &self.config {
            Some(path) => read_config(path),
            None => Options::default(),
        };
        if let Some(format) = self.format {
            options.format = format;
        }
        if self.escape_html {
            options.escape_html = true;
        }
        if self.suppress_eval {
            options.suppress_eval = true;
        }
        if let Some(wrapper) = self.attr_wrapper {
            options.attr_wrapper = wrapper;
        }
        log::debug!("options: {options:?}");
        options
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Check { path, options } => cmd_check(&path, &options.resolve()),
        Command::Compile { path, options } => cmd_compile(&path, &options.resolve()),
        Command::Render { path, options } => cmd_render(&path, options.resolve()),
        Command::Filters => cmd_filters(),
    }
}

fn read_source(path: &str) -> String {
    if path == "-" {
        let mut source = String::new();
        if let Err(e) = std::io::stdin().read_to_string(&mut source) {
            eprintln!("Error reading stdin: {e}");
            std::process::exit(1);
        }
        return source;
    }

    let p = Path::new(path);
    if !p.exists() {
        eprintln!("Error: file not found: {path}");
        std::process::exit(1);
    }
    match std::fs::read_to_string(p) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error reading {path}: {e}");
            std::process::exit(1);
        }
    }
}

fn read_config(path: &str) -> Options {
    let text = read_source(path);
    match serde_json::from_str(&text) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error in config {path}: {e}");
            std::process::exit(1);
        }
    }
}

fn compile(path: &str, options: &Options) -> haml_codegen::Program {
    let source = read_source(path);
    match haml_codegen::compile(&source, options) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

fn cmd_check(path: &str, options: &Options) {
    let source = read_source(path);

    let document = match haml_parser::Parser::parse(&source) {
        Ok(document) => document,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };
    log::debug!("parsed {} top-level nodes", document.nodes.len());

    // Parsing alone misses doctype and filter errors.
    if let Err(e) = haml_codegen::compile(&source, options) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    eprintln!("OK: {path}");
}

fn cmd_compile(path: &str, options: &Options) {
    let program = compile(path, options);
    print!("{program}");
}

fn cmd_render(path: &str, mut options: Options) {
    options.suppress_eval = true;
    let program = compile(path, &options);

    match Renderer::new(&program).render(&mut Static) {
        Ok(html) => print!("{html}"),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

fn cmd_filters() {
    for name in haml_codegen::FilterRegistry::builtin().names() {
        println!("{name}");
    }
}

/// Evaluator for programs compiled with `suppress_eval`, which never ask
/// for one.
struct Static;

impl Evaluator for Static {
    fn evaluate(&mut self, code: &str) -> Result<Value, EvalError> {
        Err(EvalError::Failed(format!("no evaluator for `{code}`")))
    }

    fn run_block(
        &mut self,
        block: &BlockStatement,
        _body: &mut dyn FnMut(&mut Self) -> Result<(), EvalError>,
    ) -> Result<Option<Value>, EvalError> {
        Err(EvalError::Failed(format!("no evaluator for `{}`", block.code)))
    }
}
