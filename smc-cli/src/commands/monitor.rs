use std::time::Duration;

use anyhow::Result;
use clap::{Args, ValueEnum};
use smc_client::monitoring::{QueryPayload, SessionQuery, StreamOptions};
use smc_client::SessionContext;

#[derive(Clone, Copy, ValueEnum)]
pub enum MonitorKind {
    Connections,
    Blacklist,
    Routing,
    Users,
    VpnSa,
    SslVpn,
    Alerts,
}

#[derive(Args)]
pub struct MonitorArgs {
    /// What to inspect on the engine
    #[arg(value_enum)]
    kind: MonitorKind,

    /// Name of the engine to query
    target: String,

    /// Seconds a single read may block
    #[arg(long, default_value_t = 60)]
    timeout: u64,
}

pub async fn execute(session: &SessionContext, args: MonitorArgs) -> Result<()> {
    let query = match args.kind {
        MonitorKind::Connections => SessionQuery::connections(&args.target),
        MonitorKind::Blacklist => SessionQuery::blacklist(&args.target),
        MonitorKind::Routing => SessionQuery::routing(&args.target),
        MonitorKind::Users => SessionQuery::users(&args.target),
        MonitorKind::VpnSa => SessionQuery::vpn_security_associations(&args.target),
        MonitorKind::SslVpn => SessionQuery::ssl_vpn_sessions(&args.target),
        MonitorKind::Alerts => SessionQuery::active_alerts(&args.target),
    };

    let options = StreamOptions::default().with_read_timeout(Duration::from_secs(args.timeout));
    let mut stream = query.execute(session, options).await?;

    let mut total = 0usize;
    while let Some(payload) = stream.next().await {
        match payload? {
            QueryPayload::Records(batch) => {
                for record in &batch.records {
                    println!("{}", serde_json::to_string(record)?);
                }
                total += batch.records.len();
                if batch.end {
                    break;
                }
            }
            QueryPayload::Fields(_) => {}
        }
    }

    if total == 0 {
        println!("No entries");
    }
    Ok(())
}
