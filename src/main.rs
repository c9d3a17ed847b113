use std::collections::BTreeMap;
use std::env;
use std::io::{self, Read, Write};
use std::process;

use serde::Serialize;
use tracing_subscriber::EnvFilter;
use zenith_core::{Params, RouteTable, RoutesConfig};

#[derive(Debug, Serialize)]
struct ResolvedLine<'a> {
    url: &'a str,
    title: Option<String>,
    name: Option<String>,
    path: String,
    params: Params,
    query: BTreeMap<String, String>,
}

fn main() {
    // Logs go to stderr; stdout carries the JSON lines. `RUST_LOG` overrides.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .try_init();

    if let Err(err) = run() {
        eprintln!("[zenith-route] {}", err);
        process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let urls = parse_urls()?;

    let mut stdin_payload = String::new();
    io::stdin()
        .read_to_string(&mut stdin_payload)
        .map_err(|e| format!("failed to read stdin: {e}"))?;

    if stdin_payload.trim().is_empty() {
        return Err("stdin payload is empty".into());
    }

    let config: RoutesConfig =
        serde_json::from_str(&stdin_payload).map_err(|e| format!("invalid routes JSON: {e}"))?;
    if config.routes.is_empty() {
        return Err("routes config declares no routes".into());
    }
    let table = RouteTable::from_config(config).map_err(|e| e.to_string())?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for url in &urls {
        let route = table.resolve(url).map_err(|e| e.to_string())?;
        let line = ResolvedLine {
            url,
            title: route.title,
            name: route.name,
            path: route.path,
            params: route.params,
            query: route.query_params,
        };
        let json =
            serde_json::to_string(&line).map_err(|e| format!("failed to encode result: {e}"))?;
        writeln!(out, "{json}").map_err(|e| format!("failed to write stdout: {e}"))?;
    }

    Ok(())
}

fn parse_urls() -> Result<Vec<String>, String> {
    let mut urls = Vec::new();
    let mut args = env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--url" => {
                let value = args
                    .next()
                    .ok_or_else(|| "missing value for --url".to_string())?;
                urls.push(value);
            }
            _ => {
                return Err(format!(
                    "unknown argument '{arg}'. usage: zenith-route --url <url> [--url <url>...]"
                ));
            }
        }
    }

    if urls.is_empty() {
        return Err("required flag missing: --url <url>".into());
    }
    Ok(urls)
}
