//! RelayKV CLI Client
//!
//! Command-line interface for interacting with RelayKV. Runs one command
//! when given a subcommand, otherwise reads request lines from stdin.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use clap::{Parser, Subcommand};
use relaykv::network::Client;
use relaykv::RelayError;

/// RelayKV CLI
#[derive(Parser, Debug)]
#[command(name = "relaykv-cli")]
#[command(about = "CLI for the RelayKV key-value store")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:3223")]
    address: String,

    /// Per-request timeout in seconds (0 waits forever)
    #[arg(short, long, default_value = "10")]
    timeout: u64,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },
}

fn main() {
    let args = Args::parse();

    let mut client = match Client::connect(args.address.as_str()) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Failed to connect to {}: {}", args.address, e);
            std::process::exit(1);
        }
    };
    let timeout = Some(Duration::from_secs(args.timeout)).filter(|t| !t.is_zero());
    if let Err(e) = client.set_timeout(timeout) {
        eprintln!("Failed to configure connection: {}", e);
        std::process::exit(1);
    }

    let code = match args.command {
        Some(command) => run_once(&mut client, command),
        None => run_interactive(&mut client),
    };
    std::process::exit(code);
}

fn run_once(client: &mut Client, command: Commands) -> i32 {
    let result = match command {
        Commands::Get { key } => client.get(&key).map(|value| println!("{}", value)),
        Commands::Set { key, value } => client.set(&key, &value).map(|_| println!("OK")),
        Commands::Del { key } => client.delete(&key).map(|_| println!("OK")),
    };

    match result {
        Ok(()) => 0,
        Err(RelayError::NotFound) => {
            println!("NOT_FOUND");
            1
        }
        Err(e) => {
            eprintln!("ERROR {}", e);
            1
        }
    }
}

/// Forward each stdin line verbatim and print the raw reply
fn run_interactive(client: &mut Client) -> i32 {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        let _ = stdout.flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => return 0,
            Ok(_) => {}
            Err(e) => {
                eprintln!("Failed to read input: {}", e);
                return 1;
            }
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            return 0;
        }

        match client.send_line(line) {
            Ok(reply) => println!("{}", reply),
            Err(e) => {
                eprintln!("Connection error: {}", e);
                return 1;
            }
        }
    }
}
