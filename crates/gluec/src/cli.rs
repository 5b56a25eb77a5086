use std::collections::BTreeMap;
use std::path::Path;

use glue_rt::{json, log};

use crate::codec;
use crate::server::{RouteTable, ServeConfig, Server};
use crate::{LoadError, eval_program, parse_file};

const USAGE: &str =
    "usage: gluec [--debug|--dump-ast] [--eval] [--port N] [--output FILE] <source_file>";

#[derive(Debug, Default, PartialEq, Eq)]
struct Options {
    debug: bool,
    eval: bool,
    port: Option<u16>,
    output: Option<String>,
    path: String,
}

enum Parsed {
    Run(Options),
    Help,
}

pub fn run<I>(args: I) -> i32
where
    I: IntoIterator<Item = String>,
{
    let options = match parse_args(args) {
        Ok(Parsed::Run(options)) => options,
        Ok(Parsed::Help) => {
            println!("{USAGE}");
            return 0;
        }
        Err(message) => {
            if !message.is_empty() {
                eprintln!("{message}");
            }
            eprintln!("{USAGE}");
            return 1;
        }
    };

    if let Some(output) = &options.output {
        log::warn(&format!("--output {output} is accepted but unused"));
    }

    let (program, diags) = match parse_file(Path::new(&options.path)) {
        Ok(parsed) => parsed,
        Err(LoadError::Io { path, source }) => {
            eprintln!("failed to read {}: {source}", path.display());
            return 1;
        }
        Err(LoadError::Parse(err)) => {
            eprintln!("{err}");
            return 1;
        }
    };
    for diag in &diags {
        eprintln!("{diag}");
    }

    if options.debug {
        println!("{:#?}", program);
    }

    if options.eval {
        let result = eval_program(&program, |api, evaluator| {
            if options.debug {
                let vars: BTreeMap<String, json::JsonValue> = evaluator
                    .variables()
                    .iter()
                    .map(|(name, value)| (name.clone(), codec::value_to_json(value)))
                    .collect();
                eprintln!(
                    "variables after {} (port {}):\n{}",
                    api.path.value,
                    api.port,
                    json::encode_pretty(&json::JsonValue::Object(vars))
                );
            }
        });
        return match result {
            Ok(output) => {
                print!("{output}");
                0
            }
            Err(err) => {
                eprintln!("execution error: {err}");
                1
            }
        };
    }

    let routes = RouteTable::from_program(program, options.port);
    for (port, path) in routes.routes() {
        println!("listen :{port} {path}");
    }
    let config = match ServeConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return 1;
        }
    };
    let server = match Server::bind(routes, config) {
        Ok(server) => server,
        Err(err) => {
            eprintln!("{err}");
            return 1;
        }
    };
    match server.serve() {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{err}");
            1
        }
    }
}

fn parse_args<I>(args: I) -> Result<Parsed, String>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut options = Options::default();
    let mut path = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Parsed::Help),
            "--debug" | "--dump-ast" => options.debug = true,
            "--eval" => options.eval = true,
            "--port" | "--listen" => {
                let Some(raw) = args.next() else {
                    return Err(format!("{arg} expects a port"));
                };
                match raw.parse::<u16>() {
                    Ok(port) if port > 0 => options.port = Some(port),
                    _ => return Err(format!("invalid port: {raw}")),
                }
            }
            "--output" => {
                let Some(file) = args.next() else {
                    return Err("--output expects a file name".to_string());
                };
                options.output = Some(file);
            }
            _ if arg.starts_with('-') => return Err(format!("unknown flag: {arg}")),
            _ => {
                if path.is_some() {
                    return Err(format!("unexpected argument: {arg}"));
                }
                path = Some(arg);
            }
        }
    }

    options.path = path.ok_or_else(String::new)?;
    Ok(Parsed::Run(options))
}
