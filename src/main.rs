//! forge – command-line front end for the PDF and Word pipelines.
//!
//! Usage:
//!   forge pdf <output.pdf> [--request req.json] [--template page.html]
//!             [--ejs] [--data data.json] [--config cfg.json]
//!   forge word <output.docx> [--request req.json] [--template t.docx]
//!              [--config cfg.json]
//!   forge samples <dir>
//!
//! `--template` overrides the template named in the request file; with no
//! request file the template is rendered without substitutions.

use std::{env, fs, path::PathBuf, process};

use doc_forge::templates::write_samples;
use doc_forge::{
    DocumentRequest, ForgeConfig, ForgeError, PdfPipeline, PdfRequest, TemplateKind, WordPipeline,
};

#[derive(Default)]
struct Options {
    output: Option<PathBuf>,
    request: Option<PathBuf>,
    template: Option<PathBuf>,
    data: Option<PathBuf>,
    config: Option<PathBuf>,
    ejs: bool,
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let prog = args.first().map(String::as_str).unwrap_or("forge");

    let Some(command) = args.get(1) else {
        print_usage(prog);
        process::exit(1);
    };
    if matches!(command.as_str(), "--help" | "-h") {
        print_usage(prog);
        process::exit(0);
    }

    let options = match parse_options(&args[2..]) {
        Ok(o) => o,
        Err(msg) => {
            eprintln!("Error: {msg}");
            print_usage(prog);
            process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error starting runtime: {e}");
            process::exit(1);
        }
    };

    let result = match command.as_str() {
        "pdf" => runtime.block_on(run_pdf(&options)),
        "word" => runtime.block_on(run_word(&options)),
        "samples" => run_samples(&options),
        other => {
            eprintln!("Unknown command: {other}");
            print_usage(prog);
            process::exit(1);
        }
    };

    if let Err(e) = result {
        log::error!("{e}");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn parse_options(args: &[String]) -> Result<Options, String> {
    let mut options = Options::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .map(PathBuf::from)
                .ok_or_else(|| format!("{flag} needs a value"))
        };
        match arg.as_str() {
            "--request" | "-r" => options.request = Some(value("--request")?),
            "--template" | "-t" => options.template = Some(value("--template")?),
            "--data" | "-d" => options.data = Some(value("--data")?),
            "--config" | "-c" => options.config = Some(value("--config")?),
            "--ejs" => options.ejs = true,
            other if other.starts_with('-') => return Err(format!("Unknown flag: {other}")),
            path if options.output.is_none() => options.output = Some(PathBuf::from(path)),
            path => return Err(format!("Unexpected argument: {path}")),
        }
    }
    Ok(options)
}

fn load_config(options: &Options) -> Result<ForgeConfig, ForgeError> {
    match &options.config {
        Some(path) => ForgeConfig::from_json_file(path),
        None => Ok(ForgeConfig::default()),
    }
}

fn required_output(options: &Options) -> Result<&PathBuf, ForgeError> {
    options
        .output
        .as_ref()
        .ok_or_else(|| ForgeError::InvalidInput("no output path specified".to_string()))
}

async fn run_pdf(options: &Options) -> Result<(), ForgeError> {
    let output = required_output(options)?;
    let mut request = match &options.request {
        Some(path) => PdfRequest::from_json(&fs::read_to_string(path)?)?,
        None => PdfRequest::default(),
    };
    if let Some(template) = &options.template {
        request.template = template.clone();
    }
    if options.ejs {
        request.template_kind = TemplateKind::TemplateLanguage;
    }
    if let Some(data) = &options.data {
        request.template_data = Some(fs::read_to_string(data)?);
    }

    PdfPipeline::new(load_config(options)?)
        .render(&request, output)
        .await?;
    eprintln!("Wrote '{}'", output.display());
    Ok(())
}

async fn run_word(options: &Options) -> Result<(), ForgeError> {
    let output = required_output(options)?;
    let mut request = match &options.request {
        Some(path) => DocumentRequest::from_json(&fs::read_to_string(path)?)?,
        None => DocumentRequest::default(),
    };
    if let Some(template) = &options.template {
        request.template = template.clone();
    }

    let summary = WordPipeline::new(load_config(options)?)
        .render(&request, output)
        .await?;
    eprintln!(
        "Wrote '{}' ({} token{}, {} row{}, {} image{} replaced, {} skipped)",
        output.display(),
        summary.tokens_replaced,
        plural(summary.tokens_replaced),
        summary.rows_appended,
        plural(summary.rows_appended),
        summary.images_replaced,
        plural(summary.images_replaced),
        summary.images_skipped
    );
    Ok(())
}

fn run_samples(options: &Options) -> Result<(), ForgeError> {
    let dir = required_output(options)?;
    for path in write_samples(dir)? {
        eprintln!("Wrote '{}'", path.display());
    }
    Ok(())
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

fn print_usage(prog: &str) {
    eprintln!("forge – template substitution for PDF and Word documents (doc-forge)");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} pdf <output.pdf> [--request req.json] [--template page.html] [--ejs] [--data data.json] [--config cfg.json]");
    eprintln!("  {prog} word <output.docx> [--request req.json] [--template t.docx] [--config cfg.json]");
    eprintln!("  {prog} samples <dir>");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --request, -r   JSON request (placeholders, tables, images)");
    eprintln!("  --template, -t  Template path, overrides the request's template");
    eprintln!("  --ejs           Treat the template as a template-language source");
    eprintln!("  --data, -d      JSON data file for the template-language compiler");
    eprintln!("  --config, -c    JSON configuration (tool paths, working directories)");
    eprintln!("  --help          Print this message");
    eprintln!();
    eprintln!("Set RUST_LOG=debug for stage-by-stage logging.");
}
