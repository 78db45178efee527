/// txstream batching benchmark
///
/// Runs a unary workload over an in-process loopback channel and reports how
/// many wire frames the batching windows turned it into.

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use txstream_core::{
    loopback, metrics, BidirectionalStream, LoopbackServer, RequestTransmitter, TransmitterConfig,
};
use txstream_proto::transaction::{self, commit, query, req, res, server};

#[derive(Parser, Debug)]
#[command(name = "txstream-bench")]
#[command(about = "Measure request batching over a loopback transaction stream", long_about = None)]
struct Args {
    /// Total number of requests to send
    #[arg(short, long, default_value = "10000")]
    requests: usize,

    /// Number of tasks issuing requests concurrently
    #[arg(short, long, default_value = "8")]
    concurrency: usize,

    /// First flush window in microseconds
    #[arg(long, default_value = "1000")]
    window_small_us: u64,

    /// Drain window in microseconds
    #[arg(long, default_value = "3000")]
    window_large_us: u64,

    /// Maximum encoded frame size in bytes
    #[arg(long, default_value = "1000000")]
    max_frame_bytes: usize,

    /// Bypass batching and write every request immediately
    #[arg(long)]
    immediate: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Print Prometheus metrics after the run
    #[arg(long)]
    metrics: bool,
}

#[derive(Debug, Serialize)]
struct Report {
    requests: usize,
    frames: usize,
    requests_per_frame: f64,
    elapsed_ms: u128,
    requests_per_sec: f64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to info level, can override with RUST_LOG env var
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(true)
        .init();

    let args = Args::parse();
    if args.metrics {
        metrics::register_metrics();
    }

    let config = TransmitterConfig::new()
        .with_batch_window_small(Duration::from_micros(args.window_small_us))
        .with_batch_window_large(Duration::from_micros(args.window_large_us))
        .with_max_frame_bytes(args.max_frame_bytes);
    config
        .validate()
        .map_err(anyhow::Error::msg)
        .context("Invalid batching configuration")?;

    info!(
        requests = args.requests,
        concurrency = args.concurrency,
        immediate = args.immediate,
        "Starting benchmark"
    );

    let transmitter = RequestTransmitter::new(config)?;
    let (channel, server) = loopback();
    let echo = spawn_responder(server);
    let stream = std::sync::Arc::new(BidirectionalStream::new(channel, &transmitter)?);

    let start = Instant::now();
    let workers = args.concurrency.max(1);
    let per_worker = args.requests / workers;
    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let stream = std::sync::Arc::clone(&stream);
        let count = per_worker + usize::from(worker < args.requests % workers);
        let batch = !args.immediate;
        handles.push(tokio::spawn(async move {
            for i in 0..count {
                let request = if i % 2 == 0 {
                    envelope(req::Req::CommitReq(commit::Req {}))
                } else {
                    envelope(req::Req::QueryReq(query::Req {
                        query: format!("match $w{}_{};", worker, i),
                        options: None,
                    }))
                };
                stream.single(request, batch)?.get().await?;
            }
            Ok::<_, txstream_core::Error>(())
        }));
    }
    for handle in handles {
        handle.await.context("Worker panicked")??;
    }
    let elapsed = start.elapsed();

    stream.close(None);
    let frames = echo.await.context("Responder panicked")?;

    let report = Report {
        requests: args.requests,
        frames,
        requests_per_frame: args.requests as f64 / frames.max(1) as f64,
        elapsed_ms: elapsed.as_millis(),
        requests_per_sec: args.requests as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Requests:          {}", report.requests);
        println!("Frames:            {}", report.frames);
        println!("Requests / frame:  {:.2}", report.requests_per_frame);
        println!("Elapsed:           {} ms", report.elapsed_ms);
        println!("Throughput:        {:.0} req/s", report.requests_per_sec);
    }

    if args.metrics {
        print!(
            "{}",
            metrics::encode_metrics().map_err(|e| anyhow::anyhow!("{}", e))?
        );
    }

    Ok(())
}

fn envelope(payload: req::Req) -> transaction::Req {
    transaction::Req {
        req_id: Vec::new(),
        metadata: HashMap::new(),
        req: Some(payload),
    }
}

/// Answer every request with its matching response. Returns the number of
/// frames received once the client ends its write side.
fn spawn_responder(mut server: LoopbackServer) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut frames = 0;
        while let Some(frame) = server.recv().await {
            frames += 1;
            debug!(reqs = frame.reqs.len(), "Received frame");
            for request in frame.reqs {
                let result = match request.req {
                    Some(req::Req::CommitReq(_)) => res::Res::CommitRes(commit::Res {}),
                    Some(req::Req::QueryReq(q)) => res::Res::QueryRes(query::Res {
                        answer: q.query.into_bytes(),
                    }),
                    _ => continue,
                };
                server.send(transaction::Server {
                    server: Some(server::Server::Res(transaction::Res {
                        req_id: request.req_id,
                        res: Some(result),
                    })),
                });
            }
        }
        frames
    })
}
