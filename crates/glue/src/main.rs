use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use glue_rt::config as rt_config;
use serde::Deserialize;

const USAGE: &str = r#"usage: glue <command> [options] [entry] [-- <gluec flags>]

commands:
  run       Serve the package entrypoint
  check     Parse the entrypoint and report diagnostics

options:
  --manifest <path>  Path to glue.toml or its directory (defaults to nearest parent)
"#;

const MANIFEST_FILE: &str = "glue.toml";

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    package: PackageConfig,
    #[serde(default)]
    serve: Option<ServeSection>,
}

#[derive(Debug, Default, Deserialize)]
struct PackageConfig {
    #[serde(alias = "main")]
    entry: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServeSection {
    host: Option<String>,
    workers: Option<usize>,
    port: Option<u16>,
    max_requests: Option<usize>,
}

#[derive(Default)]
struct CommonArgs {
    manifest_path: Option<PathBuf>,
    entry: Option<String>,
    program_args: Vec<String>,
}

#[derive(Copy, Clone)]
enum Command {
    Run,
    Check,
}

impl Command {
    fn tag(self) -> &'static str {
        match self {
            Command::Run => "run",
            Command::Check => "check",
        }
    }
}

fn emit_cli_error(message: &str) {
    eprintln!("error: {message}");
}

fn emit_cli_warning(message: &str) {
    eprintln!("warning: {message}");
}

fn emit_command_step(command: Command, message: &str) {
    eprintln!("[{}] {message}", command.tag());
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    std::process::exit(run(args));
}

fn run(args: Vec<String>) -> i32 {
    let Some((cmd, rest)) = args.split_first() else {
        eprintln!("{USAGE}");
        return 1;
    };
    let command = match cmd.as_str() {
        "run" => Command::Run,
        "check" => Command::Check,
        "-h" | "--help" | "help" => {
            println!("{USAGE}");
            return 0;
        }
        other => {
            emit_cli_error(&format!("unknown command: {other}"));
            eprintln!("{USAGE}");
            return 1;
        }
    };
    let common = match parse_common_args(rest, matches!(command, Command::Run)) {
        Ok(common) => common,
        Err(err) => {
            emit_cli_error(&err);
            eprintln!("{USAGE}");
            return 1;
        }
    };
    let (manifest, manifest_dir) = match load_manifest(common.manifest_path.as_deref()) {
        Ok(found) => found,
        Err(err) => {
            emit_cli_error(&err);
            return 1;
        }
    };
    let entry = match resolve_entry(&common, manifest.as_ref(), manifest_dir.as_deref()) {
        Ok(entry) => entry,
        Err(err) => {
            emit_cli_error(&err);
            return 1;
        }
    };
    match command {
        Command::Run => {
            apply_dotenv(manifest_dir.as_deref());
            apply_serve_env(manifest.as_ref());
            let args = gluec_args(manifest.as_ref(), &entry, &common.program_args);
            gluec::cli::run(args)
        }
        Command::Check => finalize_command(command, run_check(&entry)),
    }
}

fn finalize_command(command: Command, code: i32) -> i32 {
    if code == 0 {
        emit_command_step(command, "ok");
    } else {
        emit_command_step(command, "failed");
    }
    code
}

fn parse_common_args(args: &[String], allow_program_args: bool) -> Result<CommonArgs, String> {
    let mut out = CommonArgs::default();
    let mut idx = 0;
    while idx < args.len() {
        let arg = &args[idx];
        if arg == "--" {
            if !allow_program_args {
                return Err("unexpected --".to_string());
            }
            out.program_args.extend(args[idx + 1..].iter().cloned());
            break;
        }
        if arg == "--manifest" || arg == "--manifest-path" {
            idx += 1;
            let Some(path) = args.get(idx) else {
                return Err(format!("{arg} expects a path"));
            };
            out.manifest_path = Some(PathBuf::from(path));
            idx += 1;
            continue;
        }
        if arg.starts_with("--") {
            return Err(format!("unknown option: {arg}"));
        }
        if out.entry.is_none() {
            if out.manifest_path.is_none() {
                let candidate = PathBuf::from(arg);
                if candidate.is_dir() && candidate.join(MANIFEST_FILE).exists() {
                    out.manifest_path = Some(candidate);
                    idx += 1;
                    continue;
                }
            }
            out.entry = Some(arg.clone());
            idx += 1;
            continue;
        }
        return Err(format!("unexpected argument: {arg}"));
    }
    Ok(out)
}

fn load_manifest(
    manifest_override: Option<&Path>,
) -> Result<(Option<Manifest>, Option<PathBuf>), String> {
    let (manifest_path, manifest_dir) = match manifest_override {
        Some(path) if path.is_dir() => (Some(path.join(MANIFEST_FILE)), Some(path.to_path_buf())),
        Some(path) => (
            Some(path.to_path_buf()),
            path.parent().map(Path::to_path_buf),
        ),
        None => {
            let cwd = env::current_dir().map_err(|err| format!("cwd error: {err}"))?;
            let path = find_manifest(&cwd);
            let dir = path.as_ref().and_then(|p| p.parent().map(Path::to_path_buf));
            (path, dir)
        }
    };

    let Some(path) = manifest_path else {
        return Ok((None, None));
    };
    let content = fs::read_to_string(&path)
        .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
    let manifest = parse_manifest(&content)?;
    Ok((Some(manifest), manifest_dir))
}

fn parse_manifest(content: &str) -> Result<Manifest, String> {
    toml::from_str(content).map_err(|err| format!("invalid manifest: {err}"))
}

fn find_manifest(start: &Path) -> Option<PathBuf> {
    let mut dir = start;
    loop {
        let candidate = dir.join(MANIFEST_FILE);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
}

fn resolve_entry(
    common: &CommonArgs,
    manifest: Option<&Manifest>,
    manifest_dir: Option<&Path>,
) -> Result<PathBuf, String> {
    let entry = common
        .entry
        .clone()
        .or_else(|| manifest.and_then(|m| m.package.entry.clone()));
    let Some(entry) = entry else {
        return Err(
            "missing entry: pass a file path or set package.entry in glue.toml".to_string(),
        );
    };
    let path = PathBuf::from(&entry);
    if path.is_absolute() {
        return Ok(path);
    }
    // an explicit entry is relative to the working directory
    if common.entry.is_none() {
        if let Some(dir) = manifest_dir {
            return Ok(dir.join(path));
        }
    }
    let cwd = env::current_dir().map_err(|err| format!("cwd error: {err}"))?;
    Ok(cwd.join(path))
}

/// Loads `KEY=VALUE` lines from `.env` beside the manifest. Variables already set win.
fn apply_dotenv(manifest_dir: Option<&Path>) {
    let path = match manifest_dir {
        Some(dir) => dir.join(".env"),
        None => PathBuf::from(".env"),
    };
    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return,
        Err(err) => {
            emit_cli_warning(&format!("failed to read {}: {err}", path.display()));
            return;
        }
    };
    for (key, value) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue;
        }
        unsafe {
            env::set_var(key, value);
        }
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();
        let unquoted = ['"', '\'']
            .iter()
            .find_map(|quote| {
                value
                    .strip_prefix(*quote)
                    .and_then(|rest| rest.strip_suffix(*quote))
            })
            .unwrap_or(value);
        out.push((key.to_string(), unquoted.to_string()));
    }
    out
}

/// Exports `[serve]` settings as `GLUE_*` variables unless the environment already has them.
fn apply_serve_env(manifest: Option<&Manifest>) {
    let Some(serve) = manifest.and_then(|m| m.serve.as_ref()) else {
        return;
    };
    for (field, value) in serve_env_pairs(serve) {
        let key = rt_config::env_key("glue", field);
        if env::var_os(&key).is_some() {
            continue;
        }
        unsafe {
            env::set_var(key, value);
        }
    }
}

fn serve_env_pairs(serve: &ServeSection) -> Vec<(&'static str, String)> {
    let mut out = Vec::new();
    if let Some(host) = &serve.host {
        out.push(("host", host.clone()));
    }
    if let Some(workers) = serve.workers {
        out.push(("workers", workers.to_string()));
    }
    if let Some(max_requests) = serve.max_requests {
        out.push(("max_requests", max_requests.to_string()));
    }
    out
}

/// Flags handed to `gluec`: the manifest port unless the caller passed one, then
/// the caller's flags, then the entry path.
fn gluec_args(manifest: Option<&Manifest>, entry: &Path, program_args: &[String]) -> Vec<String> {
    let mut args = Vec::new();
    let caller_port = program_args
        .iter()
        .any(|arg| arg == "--port" || arg == "--listen");
    if !caller_port {
        if let Some(port) = manifest.and_then(|m| m.serve.as_ref()).and_then(|s| s.port) {
            args.push("--port".to_string());
            args.push(port.to_string());
        }
    }
    args.extend(program_args.iter().cloned());
    args.push(entry.to_string_lossy().into_owned());
    args
}

fn run_check(entry: &Path) -> i32 {
    match gluec::parse_file(entry) {
        Ok((program, diags)) => {
            for diag in &diags {
                eprintln!("{diag}");
            }
            for api in &program.apis {
                println!("api :{} {}", api.port, api.path.value);
            }
            0
        }
        Err(gluec::LoadError::Parse(err)) => {
            emit_cli_error(&format!("{}: {err}", entry.display()));
            1
        }
        Err(err) => {
            emit_cli_error(&err.to_string());
            1
        }
    }
}
