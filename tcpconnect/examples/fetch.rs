//! Sends one message to a TCP server and prints the whole reply.
//!
//! ```text
//! RUST_LOG=tcpconnect=debug cargo run --example fetch -- 127.0.0.1 7 ping
//! ```

use tcpconnect::binding::{self, Value};
use tcpconnect::{ConnectOptions, EventLoop, tcp_connect_with};

use std::env;
use std::process::ExitCode;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().skip(1).collect();

    let mut event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(err) => {
            eprintln!("cannot create event loop: {err}");
            return ExitCode::FAILURE;
        }
    };

    // With a fourth argument, the typed entry point is used with a timeout
    // in milliseconds. Otherwise arguments go through the host binding.
    let promise = match args.as_slice() {
        [host, port, message, timeout_ms] => {
            let (Ok(port), Ok(timeout_ms)) = (port.parse::<u16>(), timeout_ms.parse::<u64>())
            else {
                eprintln!("port and timeout must be integers");
                return ExitCode::FAILURE;
            };
            let options = ConnectOptions::new().timeout(Duration::from_millis(timeout_ms));
            tcp_connect_with(&mut event_loop, host, port, message, &options)
        }
        _ => {
            let values: Vec<Value> = args
                .iter()
                .enumerate()
                .map(|(i, arg)| match (i, arg.parse::<f64>()) {
                    (1, Ok(port)) => Value::Number(port),
                    _ => Value::from(arg.as_str()),
                })
                .collect();

            match binding::tcp_connect(&mut event_loop, &values) {
                Ok(promise) => promise,
                Err(err) => {
                    eprintln!("{}: {err}", binding::EXPORT_NAME);
                    eprintln!("usage: fetch <host> <port> <message> [timeout-ms]");
                    return ExitCode::FAILURE;
                }
            }
        }
    };

    if let Err(err) = event_loop.run() {
        eprintln!("event loop failed: {err}");
        return ExitCode::FAILURE;
    }

    match promise.try_take() {
        Some(Ok(text)) => {
            print!("{text}");
            ExitCode::SUCCESS
        }
        Some(Err(err)) => {
            eprintln!("request failed: {err}");
            ExitCode::FAILURE
        }
        None => {
            eprintln!("request did not settle");
            ExitCode::FAILURE
        }
    }
}
