//! Interactive line client for poking at a running relay server
//!
//! Every line typed on stdin is sent as one message; everything the server
//! sends back is printed as it arrives.

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay server address
    #[arg(short, long, default_value = "127.0.0.1:5000")]
    server: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let stream = TcpStream::connect(&args.server).await?;
    println!("Connected to {} from {}", args.server, stream.local_addr()?);
    println!("Type a message and press enter, e.g. POSITION:1,2,3 or SAVE:Lv=3|Exp=50");

    let (read_half, mut write_half) = stream.into_split();

    let printer = tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => println!("<- {}", line),
                Ok(None) => {
                    println!("Server closed the connection");
                    break;
                }
                Err(e) => {
                    eprintln!("Read failed: {}", e);
                    break;
                }
            }
        }
    });

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = input.next_line().await? {
        if printer.is_finished() {
            break;
        }
        write_half.write_all(format!("{}\n", line).as_bytes()).await?;
    }

    write_half.shutdown().await?;
    let _ = printer.await;

    Ok(())
}
