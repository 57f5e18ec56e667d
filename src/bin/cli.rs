//! SPQueue CLI Client
//!
//! Command-line interface for interacting with SPQueue.

use clap::{Parser, Subcommand};
use spqueue::network::{Client, RemoteItem};
use spqueue::{Feature, QueueType, Result};

/// SPQueue CLI
#[derive(Parser, Debug)]
#[command(name = "spqueue-cli")]
#[command(about = "CLI for the SPQueue priority queue service")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:9090")]
    server: String,

    /// Queue name (empty = default queue)
    #[arg(short, long, default_value = "")]
    queue: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a queue
    Create {
        /// Queue type (durable | in-memory)
        #[arg(short = 't', long, default_value = "durable")]
        queue_type: QueueType,

        /// Feature names, highest precedence first
        #[arg(value_delimiter = ',')]
        features: Vec<String>,
    },

    /// Add an item
    Enqueue {
        /// Item payload
        item: String,

        /// Features as name=value
        #[arg(short, long = "feature", value_parser = parse_feature)]
        features: Vec<Feature>,
    },

    /// Remove and print the highest-priority item
    Dequeue,

    /// Print the highest-priority item without removing it
    Peek,

    /// Print the queue size
    Size,

    /// Print the queue epoch
    Epoch,

    /// Print the server health status
    Check,

    /// Stream health updates
    Watch {
        /// Stop after this many events
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
}

fn parse_feature(s: &str) -> std::result::Result<Feature, String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", s))?;
    let value: f64 = value
        .parse()
        .map_err(|e| format!("bad value for '{}': {}", name, e))?;
    Ok(Feature::new(name, value))
}

fn print_item(item: &RemoteItem) {
    if item.has_item {
        println!("{} (size {})", String::from_utf8_lossy(&item.item), item.size);
    } else {
        println!("(empty, size {})", item.size);
    }
}

fn run(args: Args) -> Result<()> {
    let mut client = Client::connect(&args.server)?;
    let queue = args.queue.as_str();

    match args.command {
        Commands::Create { queue_type, features } => {
            let name = client.create_queue(queue, queue_type, features)?;
            println!("{}", name);
        }
        Commands::Enqueue { item, features } => {
            let size = client.enqueue(queue, item.into_bytes(), features)?;
            println!("size {}", size);
        }
        Commands::Dequeue => print_item(&client.dequeue(queue)?),
        Commands::Peek => print_item(&client.peek(queue)?),
        Commands::Size => println!("{}", client.get_size(queue)?),
        Commands::Epoch => println!("{}", client.get_epoch(queue)?),
        Commands::Check => println!("{}", client.check()?.as_str()),
        Commands::Watch { count } => {
            let stream = client.watch()?;
            for status in stream.take(count.unwrap_or(usize::MAX)) {
                println!("{}", status?.as_str());
            }
        }
    }

    Ok(())
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
