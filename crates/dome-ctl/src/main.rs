//! dome-ctl: streams an encoded image to a Dome receiver as chunked UDP
//! frames. Useful for exercising domed without a camera.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::net::UdpSocket;

use dome_core::wire::{fragment_frame, DEFAULT_CHUNK_SIZE, DEFAULT_LISTEN_PORT, VIDEO_STREAM_ID};

// ── Options ───────────────────────────────────────────────────────────────────

/// Highest accepted `--fps`; keeps the send interval non-zero.
const MAX_FPS: u32 = 1000;

#[derive(Debug, PartialEq)]
struct SendOptions {
    file: PathBuf,
    fps: u32,
    /// Frames to send. 0 = until interrupted.
    count: u64,
    chunk_size: usize,
    start_id: u32,
    /// Send each frame's chunks last-to-first.
    reverse: bool,
}

fn parse_send_options(args: &[&str]) -> Result<SendOptions> {
    let mut file = None;
    let mut opts = SendOptions {
        file: PathBuf::new(),
        fps: 30,
        count: 0,
        chunk_size: DEFAULT_CHUNK_SIZE,
        start_id: 0,
        reverse: false,
    };

    let mut i = 0;
    while i < args.len() {
        match args[i] {
            "--fps" => {
                i += 1;
                opts.fps = flag_value(args, i, "--fps")?;
            }
            "--count" => {
                i += 1;
                opts.count = flag_value(args, i, "--count")?;
            }
            "--chunk-size" => {
                i += 1;
                opts.chunk_size = flag_value(args, i, "--chunk-size")?;
            }
            "--start-id" => {
                i += 1;
                opts.start_id = flag_value(args, i, "--start-id")?;
            }
            "--reverse" => opts.reverse = true,
            flag if flag.starts_with("--") => bail!("unknown option: {flag}"),
            path if file.is_none() => file = Some(PathBuf::from(path)),
            extra => bail!("unexpected argument: {extra}"),
        }
        i += 1;
    }

    opts.file = file.context("send requires a file")?;
    if opts.fps == 0 || opts.fps > MAX_FPS {
        bail!("--fps must be between 1 and {MAX_FPS}");
    }
    Ok(opts)
}

fn flag_value<T: std::str::FromStr>(args: &[&str], i: usize, flag: &str) -> Result<T> {
    args.get(i)
        .with_context(|| format!("{flag} requires a value"))?
        .parse()
        .map_err(|_| anyhow::anyhow!("{flag} must be a number"))
}

// ── Subcommand handlers ───────────────────────────────────────────────────────

async fn cmd_send(addr: SocketAddr, opts: SendOptions) -> Result<()> {
    let frame = tokio::fs::read(&opts.file)
        .await
        .with_context(|| format!("failed to read {}", opts.file.display()))?;

    let bind: SocketAddr = if addr.is_ipv4() {
        "0.0.0.0:0".parse()?
    } else {
        "[::]:0".parse()?
    };
    let socket = UdpSocket::bind(bind)
        .await
        .context("failed to bind sending socket")?;

    let mut interval = tokio::time::interval(Duration::from_secs(1) / opts.fps);
    let mut frame_id = opts.start_id;
    let mut sent = 0u64;

    println!(
        "Sending {} ({} bytes) to {} at {} fps",
        opts.file.display(),
        frame.len(),
        addr,
        opts.fps
    );

    while opts.count == 0 || sent < opts.count {
        interval.tick().await;

        let mut datagrams = fragment_frame(frame_id, VIDEO_STREAM_ID, &frame, opts.chunk_size)
            .context("failed to fragment frame")?;
        if opts.reverse {
            datagrams.reverse();
        }
        for datagram in &datagrams {
            socket
                .send_to(datagram, addr)
                .await
                .with_context(|| format!("failed to send to {addr}"))?;
        }

        sent += 1;
        frame_id = frame_id.wrapping_add(1);
        if sent % u64::from(opts.fps) == 0 {
            println!("  {} frames sent ({} chunks each)", sent, datagrams.len());
        }
    }

    println!("Done: {} frames sent.", sent);
    Ok(())
}

fn print_usage() {
    println!("Usage: dome-ctl [--addr <host:port>] <command>");
    println!();
    println!("Commands:");
    println!("  send <file>   Stream <file> as repeated video frames");
    println!();
    println!("Send options:");
    println!("  --fps <n>          Frames per second, 1-{} (default: 30)", MAX_FPS);
    println!("  --count <n>        Frames to send, 0 = forever (default: 0)");
    println!("  --chunk-size <n>   Payload bytes per datagram (default: {})", DEFAULT_CHUNK_SIZE);
    println!("  --start-id <n>     First frame id (default: 0)");
    println!("  --reverse          Send chunks last-to-first");
    println!();
    println!("Options:");
    println!("  --addr <host:port>   Receiver address (default: 127.0.0.1:{})", DEFAULT_LISTEN_PORT);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --addr option
    let mut addr: SocketAddr = SocketAddr::from(([127, 0, 0, 1], DEFAULT_LISTEN_PORT));
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--addr" {
            i += 1;
            addr = args
                .get(i)
                .context("--addr requires a value")?
                .parse()
                .context("--addr must be <ip>:<port>")?;
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["send", rest @ ..]            => cmd_send(addr, parse_send_options(rest)?).await,
        ["help"] | ["--help"] | ["-h"] | [] => { print_usage(); Ok(()) }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
