use billboard_client::{
    PaintBuffer,
    Principal,
    PurchaseOrchestrator,
    Region,
    agent::HttpConnector,
    balance::BalanceState,
    canvas,
    config,
    render,
    selection::SelectionStore,
};
use color_eyre::eyre::{
    Result,
    eyre,
};
use tracing_subscriber::EnvFilter;

const SESSION_DIR: &str = ".billboard";

struct CliArgs {
    principal: String,
    region: Option<Region>,
    link: Option<String>,
    color: Option<u32>,
    balance_only: bool,
    watch: bool,
}

fn print_usage_and_exit() -> ! {
    println!(
        "Usage: billboard --principal <text> [--balance-only]\n\
         [--region x0,y0,x1,y1] [--link <url>] [--color RRGGBB]\n\
         \n\
         Flags:\n\
           --principal <text>     Principal to act as (identity is established externally)\n\
           --balance-only         Refresh and print the balance, then exit\n\
           --watch                Keep refreshing the balance every 15s until Ctrl-C\n\
           --region x0,y0,x1,y1   Rectangle to purchase (inclusive bounds)\n\
           --link <url>           http(s) link to attach to the purchased region\n\
           --color RRGGBB         Solid fill painted over the region after the claim"
    );
    std::process::exit(0);
}

fn parse_region(raw: &str) -> Result<Region> {
    let parts: Vec<u32> = raw
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|e| eyre!("Invalid --region {raw:?}: {e}"))?;
    let &[x0, y0, x1, y1] = parts.as_slice() else {
        return Err(eyre!("--region expects four comma-separated integers"));
    };
    Ok(Region::normalized(x0, y0, x1, y1))
}

fn parse_cli_args() -> Result<CliArgs> {
    let mut args = std::env::args().skip(1);
    let mut principal = None;
    let mut region = None;
    let mut link = None;
    let mut color = None;
    let mut balance_only = false;
    let mut watch = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--principal" => {
                let text = args
                    .next()
                    .ok_or_else(|| eyre!("--principal requires a value"))?;
                if principal.is_some() {
                    return Err(eyre!("--principal may only be specified once"));
                }
                principal = Some(text);
            }
            "--region" => {
                let raw = args
                    .next()
                    .ok_or_else(|| eyre!("--region requires a value"))?;
                region = Some(parse_region(&raw)?);
            }
            "--link" => {
                let url = args.next().ok_or_else(|| eyre!("--link requires a URL"))?;
                link = Some(url);
            }
            "--color" => {
                let raw = args
                    .next()
                    .ok_or_else(|| eyre!("--color requires an RRGGBB value"))?;
                let rgb = u32::from_str_radix(raw.trim_start_matches('#'), 16)
                    .map_err(|e| eyre!("Invalid --color {raw:?}: {e}"))?;
                color = Some(0xFF00_0000 | rgb);
            }
            "--balance-only" => balance_only = true,
            "--watch" => watch = true,
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    let principal =
        principal.ok_or_else(|| eyre!("Specify --principal <text> to act as"))?;
    Ok(CliArgs {
        principal,
        region,
        link,
        color,
        balance_only,
        watch,
    })
}

fn init_tracing() -> tracing_appender::non_blocking::WorkerGuard {
    let file_appender =
        tracing_appender::rolling::daily(format!("{SESSION_DIR}/logs"), "billboard.log");
    let (writer, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();
    guard
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let _guard = init_tracing();
    let args = parse_cli_args()?;

    let connector =
        HttpConnector::new(config::LEDGER_SERVICE_ID, config::BILLBOARD_SERVICE_ID)?;
    let hosts = config::HOSTS.iter().map(|h| h.to_string()).collect();
    let mut client = PurchaseOrchestrator::new(
        connector,
        hosts,
        Principal::from_text(config::OWNER_RECEIVER),
    );

    client
        .sign_in(Principal::from_text(&args.principal))
        .await?;

    match client.balance().state() {
        BalanceState::Fresh => println!(
            "Balance: {} ICP",
            canvas::format_tokens(client.balance().e8s())
        ),
        _ => println!("Balance: — (refresh failed, see log)"),
    }

    if args.watch {
        let mut ticker = tokio::time::interval(config::BALANCE_POLL_INTERVAL);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = ticker.tick() => {
                    client.refresh_balance(false).await;
                    println!(
                        "Balance: {} ICP",
                        canvas::format_tokens(client.balance().e8s())
                    );
                }
            }
        }
        return Ok(());
    }

    if args.balance_only {
        return Ok(());
    }

    // Anonymous full-canvas fetch, mirroring what a public viewer sees.
    if let Some(connection) = client.session().connection() {
        match render::fetch_canvas(connection).await {
            Ok(colors) => {
                let painted = colors.iter().filter(|c| **c != 0).count();
                println!(
                    "Canvas {}x{}: {painted} painted cells",
                    config::WIDTH,
                    config::HEIGHT
                );
            }
            Err(error) => println!("Canvas fetch failed: {error}"),
        }
    }

    let store = SelectionStore::new(SESSION_DIR)?;
    let region = match args.region.or_else(|| store.load()) {
        Some(region) => region,
        None => {
            println!("No region selected; pass --region x0,y0,x1,y1");
            return Ok(());
        }
    };
    store.save(region)?;

    let Some(link) = args.link else {
        println!(
            "Selected {}x{} ({} px, {} ICP). Pass --link to purchase.",
            region.width(),
            region.height(),
            region.pixel_count(),
            canvas::format_tokens(canvas::cost_e8s(&region))
        );
        return Ok(());
    };

    let paint = args
        .color
        .map(|color| PaintBuffer::solid(region.width(), region.height(), color));

    match client.purchase(region, paint.as_ref(), &link).await {
        Ok(receipt) => {
            println!(
                "Purchase complete: block {} (painted: {}, visibility confirmed: {})",
                receipt.block_index, receipt.painted, receipt.verified
            );
            println!(
                "Balance: {} ICP",
                canvas::format_tokens(client.balance().e8s())
            );
            store.clear()?;
        }
        Err(error) => {
            if let Some(short) = error.shortfall_e8s() {
                println!(
                    "You need {} more ICP (incl. fee) to purchase this area.",
                    canvas::format_tokens(short)
                );
            }
            return Err(error.into());
        }
    }

    Ok(())
}
