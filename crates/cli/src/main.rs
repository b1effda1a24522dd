//! # CLI - interactive key-value shell
//!
//! A REPL-style command-line interface for the flash key-value store, backed
//! by an image file standing in for the non-volatile medium. Reads commands
//! from stdin, executes them against the store, and prints results to stdout.
//! Designed for both interactive use and scripted testing (pipe commands via
//! stdin).
//!
//! ## Commands
//!
//! ```text
//! SET key value      Store a value under a key
//! GET key            Look up a key (prints value or "(nil)")
//! DEL key            Delete a key
//! EXISTS key         Existence probe ("true" / "false")
//! SIZE               Bytes consumed by live records
//! REMAINING          Bytes still available
//! RESET              Erase all logical content
//! STATS              Print store debug info
//! EXIT / QUIT        Shut down gracefully
//! ```
//!
//! ## Configuration
//!
//! All settings are controlled via environment variables:
//!
//! ```text
//! KVSTORE_IMG           image file path             (default: "kvstore.img")
//! KVSTORE_SECTORS       erase sectors, must be even (default: 16)
//! KVSTORE_SECTOR_SIZE   erase sector size in bytes  (default: 4096)
//! KVSTORE_PROGRAM_SIZE  program page size in bytes  (default: 256)
//! KVSTORE_READ_SIZE     read granularity in bytes   (default: 1)
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p cli
//! kvstore started (img=kvstore.img, 16x4096 sectors, used=288B, free=32480B)
//! > SET name Alice
//! OK
//! > GET name
//! Alice
//! > EXIT
//! bye
//! ```

use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};

use blockdev::{BlockDevice, FileBlockDevice};
use store::{Store, StoreError};

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn main() -> Result<()> {
    let img_path = env_or("KVSTORE_IMG", "kvstore.img");
    let sectors: u32 = env_or("KVSTORE_SECTORS", "16").parse().unwrap_or(16);
    let sector_size: u32 = env_or("KVSTORE_SECTOR_SIZE", "4096").parse().unwrap_or(4096);
    let program_size: u32 = env_or("KVSTORE_PROGRAM_SIZE", "256").parse().unwrap_or(256);
    let read_size: u32 = env_or("KVSTORE_READ_SIZE", "1").parse().unwrap_or(1);

    let length = sectors * sector_size;
    let bd = FileBlockDevice::open(&img_path, length, read_size, program_size, sector_size)
        .with_context(|| format!("failed to open image {img_path}"))?;
    let mut store = Store::open(bd, 0, length).context("failed to open store")?;

    println!(
        "kvstore started (img={img_path}, {sectors}x{sector_size} sectors, used={}B, free={}B)",
        store.size(),
        store.remaining()
    );

    let stdin = io::stdin();
    let mut out = io::stdout();
    let mut line = String::new();
    loop {
        print!("> ");
        out.flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }

        match run_command(&mut store, line.trim()) {
            Ok(Reply::Quit) => {
                println!("bye");
                break;
            }
            Ok(Reply::Silent) => {}
            Ok(Reply::Output(msg)) => println!("{msg}"),
            Err(e) => println!("ERR {e}"),
        }
    }
    Ok(())
}

enum Reply {
    Output(String),
    Silent,
    Quit,
}

/// Parses and executes one command line against the store.
fn run_command<B: BlockDevice>(store: &mut Store<B>, line: &str) -> Result<Reply, StoreError> {
    if line.is_empty() {
        return Ok(Reply::Silent);
    }

    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim_start()),
        None => (line, ""),
    };

    match cmd.to_ascii_uppercase().as_str() {
        "SET" => {
            let (key, value) = rest
                .split_once(char::is_whitespace)
                .map(|(k, v)| (k, v.trim_start()))
                .ok_or(StoreError::BadParam)?;
            store.write(key, value.as_bytes())?;
            Ok(Reply::Output("OK".into()))
        }
        "GET" => match store.get(rest) {
            Ok(value) => Ok(Reply::Output(String::from_utf8_lossy(&value).into_owned())),
            Err(StoreError::ItemNotFound) => Ok(Reply::Output("(nil)".into())),
            Err(e) => Err(e),
        },
        "DEL" => {
            store.delete(rest)?;
            Ok(Reply::Output("OK".into()))
        }
        "EXISTS" => Ok(Reply::Output(store.contains(rest)?.to_string())),
        "SIZE" => Ok(Reply::Output(format!("{} bytes", store.size()))),
        "REMAINING" => Ok(Reply::Output(format!("{} bytes", store.remaining()))),
        "RESET" => {
            store.reset()?;
            Ok(Reply::Output("OK".into()))
        }
        "STATS" => Ok(Reply::Output(format!("{store:?}"))),
        "EXIT" | "QUIT" => Ok(Reply::Quit),
        other => Ok(Reply::Output(format!(
            "unknown command: {other} (try SET/GET/DEL/EXISTS/SIZE/REMAINING/RESET/STATS/EXIT)"
        ))),
    }
}
