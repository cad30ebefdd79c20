use std::time::Duration;

use anyhow::{bail, Result};
use clap::Args;
use serde_json::Value;
use smc_client::monitoring::{LogQuery, QueryPayload, StreamOptions, TimeRange};
use smc_client::SessionContext;
use tracing::info;

#[derive(Args)]
pub struct LogsArgs {
    /// Follow logs in real time instead of fetching stored entries
    #[arg(long, short = 'f')]
    follow: bool,

    /// Max number of stored records to fetch
    #[arg(long, default_value_t = 50)]
    fetch_size: u64,

    /// Fetch oldest-first instead of the default newest-first
    #[arg(long)]
    forward: bool,

    /// Relative time window for stored queries (5m, 15m, 30m, 1h, 1d, 1w)
    #[arg(long)]
    last: Option<String>,

    /// Only records whose fields match one of these values
    #[arg(long = "match")]
    matching: Vec<String>,

    /// Seconds a single read may block before the stream is truncated
    #[arg(long, default_value_t = 60)]
    timeout: u64,
}

pub async fn execute(session: &SessionContext, args: LogsArgs) -> Result<()> {
    let mut query = if args.follow {
        LogQuery::current()
    } else {
        LogQuery::new()
            .with_fetch_size(args.fetch_size)
            .with_backwards(!args.forward)
    };

    if let Some(window) = &args.last {
        apply_window(query.time_range(), window)?;
    }
    if !args.matching.is_empty() {
        query.add_in_filter(args.matching.iter().map(|value| Value::from(value.as_str())));
    }

    let options = StreamOptions::default().with_read_timeout(Duration::from_secs(args.timeout));
    let mut stream = query.execute(session, options).await?;

    let mut total = 0usize;
    loop {
        let payload = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            payload = stream.next() => match payload {
                Some(payload) => payload?,
                None => {
                    info!("Log stream finished, {total} records");
                    return Ok(());
                }
            },
        };

        match payload {
            QueryPayload::Fields(fields) => {
                println!("# fields: {}", serde_json::to_string(&fields)?);
            }
            QueryPayload::Records(batch) => {
                for record in &batch.records {
                    println!("{}", serde_json::to_string(record)?);
                }
                total += batch.records.len();
                if batch.end {
                    break;
                }
            }
        }
    }

    // Cancelled or complete; wait for the executor to abort and close
    stream.cancel().await;
    info!("Log stream closed, {total} records");
    Ok(())
}

fn apply_window(range: &mut TimeRange, window: &str) -> Result<()> {
    match window {
        "5m" => range.last_five_minutes(),
        "15m" => range.last_fifteen_minutes(),
        "30m" => range.last_thirty_minutes(),
        "1h" => range.last_hour(),
        "1d" => range.last_day(),
        "1w" => range.last_week(),
        other => bail!("unknown time window {other}, expected 5m|15m|30m|1h|1d|1w"),
    };
    Ok(())
}
