// Copyright (c) 2018 Fabian Schuiki
#[macro_use]
extern crate clap;

use std::error::Error as StdError;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::{App, Arg, ArgMatches};
use log::{debug, error, info};

use dtdgen::generate::{generate, Settings, Target, Templates};
use dtdgen::{parse_file, Options, Result};

fn main() {
    let matches = App::new(crate_name!())
        .version(crate_version!())
        .author(crate_authors!())
        .about("Compiles a DTD into SAX handler or XSLT skeletons")
        .arg(
            Arg::with_name("DTD")
                .help("The DTD to compile")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("target")
                .short("t")
                .long("target")
                .value_name("TARGET")
                .possible_values(&["sax", "xslt", "dtd"])
                .default_value("dtd")
                .help("The kind of output to generate"),
        )
        .arg(
            Arg::with_name("templates")
                .long("templates")
                .value_name("DIR")
                .help("Directory with <name>.tpl files overriding the built-in templates"),
        )
        .arg(
            Arg::with_name("class")
                .long("class")
                .value_name("NAME")
                .help("Name of the generated class"),
        )
        .arg(
            Arg::with_name("package")
                .long("package")
                .value_name("NAME")
                .help("Package of the generated class"),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .value_name("FILE")
                .help("Write the output to a file instead of stdout"),
        )
        .arg(
            Arg::with_name("keep-pis")
                .long("keep-pis")
                .help("Keep processing instructions in the document type"),
        )
        .arg(
            Arg::with_name("base")
                .long("base")
                .value_name("DIR")
                .help("Resolve relative entity references against this directory"),
        )
        .arg(
            Arg::with_name("verbosity")
                .short("v")
                .multiple(true)
                .help("Increase message verbosity"),
        )
        .arg(
            Arg::with_name("quiet")
                .short("q")
                .long("quiet")
                .help("Silence all output"),
        )
        .get_matches();

    if let Err(e) = stderrlog::new()
        .module(module_path!())
        .quiet(matches.is_present("quiet"))
        .verbosity(matches.occurrences_of("verbosity") as usize + 1)
        .init()
    {
        eprintln!("cannot initialize logging: {}", e);
    }

    if let Err(e) = run(&matches) {
        error!("{}", e);
        let mut source = e.source();
        while let Some(cause) = source {
            error!("caused by: {}", cause);
            source = cause.source();
        }
        process::exit(1);
    }
}

fn run(matches: &ArgMatches) -> Result<()> {
    let target: Target = matches.value_of("target").unwrap_or("dtd").parse()?;
    let path = PathBuf::from(matches.value_of("DTD").unwrap_or_default());

    let options = Options {
        base_path: matches.value_of("base").map(PathBuf::from),
        keep_processing_instructions: matches.is_present("keep-pis"),
    };
    let model = parse_file(&path, &options)?;
    info!(
        "{}: {} elements, {} attribute lists, {} entities",
        path.display(),
        model.elements().len(),
        model.attribute_lists().len(),
        model.entities().len()
    );

    let mut templates = Templates::builtin(target);
    if let Some(dir) = matches.value_of("templates") {
        templates.load_dir(dir)?;
    }
    let mut settings = Settings::default();
    if let Some(class) = matches.value_of("class") {
        settings.class_name = class.to_owned();
    }
    settings.package = matches.value_of("package").map(String::from);

    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let output = generate(&model, target, &templates, &settings, &source)?;

    match matches.value_of("output") {
        Some(out) => {
            debug!("writing {}", out);
            fs::write(out, output)?;
        }
        None => io::stdout().write_all(output.as_bytes())?,
    }
    Ok(())
}
