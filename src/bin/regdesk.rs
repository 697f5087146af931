//! regdesk CLI: refresh, search, export, KPI, and edit operations against
//! the configured feeds. Endpoint URLs come from `~/.regdesk/config.json`
//! or the `REGDESK_ROWS_URL` / `REGDESK_STATS_URL` environment variables.

use std::sync::Arc;

use regdesk::audit::{HttpAuditSink, NullAuditSink};
use regdesk::config::{load_config, Config};
use regdesk::dashboard::refresh;
use regdesk::editor::{AuditSink, EditController, RowStore};
use regdesk::export::{default_filename, to_csv};
use regdesk::feed::rows::HttpRowStore;
use regdesk::feed::FeedClient;
use regdesk::poller::run_live_sync;
use regdesk::state::DashboardState;
use regdesk::types::{Actor, PaymentStatus, RowPatch};
use url::Url;

const USAGE: &str = "\
regdesk <command> [options]

Commands:
  refresh                       fetch both feeds once and report counts
  search [query] [options]      rank delegates against a query
  export [query] [options]      write the ranked view to a CSV file
  kpi                           show the reconciled KPI snapshot
  health                        show source health and latency percentiles
  set-status <id> <status>      set one delegate's payment status
  audit [--limit N]             show recent audit entries
  watch                         poll the feeds continuously (liveSync)

Search/export options:
  --status <paid|unpaid|rejected>   dropdown status filter
  --committee <name>                dropdown committee filter
  --page <n>                        result page (search only)
  --page-size <25|50|100>           rows per page
  --out <path>                      output file (export only)

Edit options:
  --actor <email>                   acting editor's e-mail";

#[tokio::main]
async fn main() {
    env_logger::init();
    let args: Vec<String> = std::env::args().skip(1).collect();
    if let Err(e) = run(&args).await {
        eprintln!("regdesk: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: &[String]) -> Result<(), String> {
    match args.first().map(String::as_str) {
        Some("refresh") => cmd_refresh().await,
        Some("search") => cmd_search(&args[1..]).await,
        Some("export") => cmd_export(&args[1..]).await,
        Some("kpi") => cmd_kpi().await,
        Some("health") => cmd_health().await,
        Some("set-status") => cmd_set_status(&args[1..]).await,
        Some("audit") => cmd_audit(&args[1..]).await,
        Some("watch") => cmd_watch().await,
        Some("help") | Some("--help") | Some("-h") | None => {
            println!("{}", USAGE);
            Ok(())
        }
        Some(other) => Err(format!("unknown command '{}' (try 'regdesk help')", other)),
    }
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

/// Value of `--name <value>`, if present.
fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// Everything that isn't a flag or a flag value, joined: the free-text query.
fn positional_query(args: &[String]) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut skip = false;
    for arg in args {
        if skip {
            skip = false;
            continue;
        }
        if arg.starts_with("--") {
            skip = true;
            continue;
        }
        out.push(arg);
    }
    out.join(" ")
}

fn parse_status(s: &str) -> Result<PaymentStatus, String> {
    PaymentStatus::parse(s).ok_or_else(|| format!("unknown status '{}'", s))
}

/// Load config, fetch both feeds, and return the populated state.
async fn synced_state(config: &Config) -> Result<Arc<DashboardState>, String> {
    let state = Arc::new(DashboardState::new(config.page_size));
    let client = FeedClient::new();
    let summary = refresh(&state, &client, config, false).await?;
    if summary.row_count == 0 {
        log::warn!("CLI: feed returned no rows");
    }
    Ok(state)
}

/// Apply the shared search/export flags onto the view.
fn apply_view_flags(state: &DashboardState, args: &[String]) -> Result<(), String> {
    state.set_query(&positional_query(args));
    if let Some(s) = flag(args, "--status") {
        state.set_status_filter(Some(parse_status(s)?));
    }
    if let Some(c) = flag(args, "--committee") {
        state.set_committee_filter(Some(c.to_string()));
    }
    if let Some(n) = flag(args, "--page-size") {
        let n: usize = n.parse().map_err(|_| format!("bad page size '{}'", n))?;
        if !regdesk::search::PAGE_SIZES.contains(&n) {
            return Err(format!(
                "page size must be one of {:?}",
                regdesk::search::PAGE_SIZES
            ));
        }
        state.set_page_size(n);
    }
    if let Some(n) = flag(args, "--page") {
        let n: usize = n.parse().map_err(|_| format!("bad page '{}'", n))?;
        state.set_page(n);
    }
    Ok(())
}

fn audit_sink(config: &Config) -> Result<Arc<dyn AuditSink>, String> {
    match &config.audit_url {
        Some(raw) => {
            let url = Url::parse(raw).map_err(|e| format!("Invalid audit URL '{}': {}", raw, e))?;
            Ok(Arc::new(HttpAuditSink::new(FeedClient::new(), url)))
        }
        None => Ok(Arc::new(NullAuditSink)),
    }
}

fn controller(
    config: &Config,
    state: Arc<DashboardState>,
) -> Result<EditController, String> {
    let rows_url = Url::parse(&config.rows_url)
        .map_err(|e| format!("Invalid rows URL '{}': {}", config.rows_url, e))?;
    let store: Arc<dyn RowStore> = Arc::new(HttpRowStore::new(FeedClient::new(), rows_url));
    Ok(EditController::new(
        state,
        store,
        audit_sink(config)?,
        &config.admin_emails,
    ))
}

fn actor_from(args: &[String]) -> Actor {
    let email = flag(args, "--actor").unwrap_or("cli@localhost").to_string();
    Actor {
        id: "cli".to_string(),
        email,
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

async fn cmd_refresh() -> Result<(), String> {
    let config = load_config()?;
    let state = Arc::new(DashboardState::new(config.page_size));
    let client = FeedClient::new();
    let summary = refresh(&state, &client, &config, false).await?;
    println!(
        "synced {} rows ({} dropped){}",
        summary.row_count,
        summary.dropped,
        if summary.kpi_stale { ", KPI stale" } else { "" }
    );
    if let Some(kpi) = summary.kpi {
        println!(
            "kpi: total {} / paid {} / unpaid {} / rejected {}{}",
            kpi.total,
            kpi.paid,
            kpi.unpaid,
            kpi.rejected,
            if kpi.mismatched { " (sources disagree)" } else { "" }
        );
    }
    let report = state.health_report();
    println!(
        "health: rows {} ({}ms), kpi {} ({}ms)",
        if report.rows.ok { "ok" } else { "failing" },
        report.rows.ms,
        if report.kpi.ok { "ok" } else { "failing" },
        report.kpi.ms
    );
    Ok(())
}

async fn cmd_search(args: &[String]) -> Result<(), String> {
    let config = load_config()?;
    let state = synced_state(&config).await?;
    apply_view_flags(&state, args)?;

    let page = state.results();
    println!(
        "{} matches, page {}/{}",
        page.total, page.page, page.page_count
    );
    println!(
        "{:<6} {:<24} {:<28} {:<20} {:<9}",
        "id", "name", "email", "committee", "status"
    );
    for item in &page.items {
        let row = &item.row;
        println!(
            "{:<6} {:<24} {:<28} {:<20} {:<9}",
            row.id,
            truncate(&row.full_name, 24),
            truncate(&row.email, 28),
            truncate(&row.committee_pref1, 20),
            row.payment_status.as_str()
        );
    }
    Ok(())
}

async fn cmd_export(args: &[String]) -> Result<(), String> {
    let config = load_config()?;
    let state = synced_state(&config).await?;
    apply_view_flags(&state, args)?;

    let ranked = state.ranked_rows();
    let rows: Vec<_> = ranked.into_iter().map(|s| s.row).collect();
    let csv = to_csv(&rows);
    let path = flag(args, "--out")
        .map(String::from)
        .unwrap_or_else(default_filename);
    std::fs::write(&path, csv).map_err(|e| format!("Failed to write {}: {}", path, e))?;
    println!("wrote {} rows to {}", rows.len(), path);
    Ok(())
}

async fn cmd_kpi() -> Result<(), String> {
    let config = load_config()?;
    let state = synced_state(&config).await?;
    let kpi = state.kpi();
    let snapshot = kpi.snapshot.ok_or("no KPI snapshot available")?;
    println!(
        "total {} / paid {} / unpaid {} / rejected {}{}",
        snapshot.total,
        snapshot.paid,
        snapshot.unpaid,
        snapshot.rejected,
        if kpi.stale { " (stale)" } else { "" }
    );
    println!(
        "sources{}: paid grid={:?} totals={:?}, unpaid grid={:?} totals={:?}",
        if snapshot.mismatched { " (DISAGREE)" } else { "" },
        snapshot.paid_shadow.grid,
        snapshot.paid_shadow.totals,
        snapshot.unpaid_shadow.grid,
        snapshot.unpaid_shadow.totals
    );
    for c in &kpi.breakdown {
        println!("  {:<24} total {:>4}  paid {:>4}  unpaid {:>4}", c.name, c.total, c.paid, c.unpaid);
    }
    Ok(())
}

async fn cmd_health() -> Result<(), String> {
    let config = load_config()?;
    let state = synced_state(&config).await?;
    let report = state.health_report();
    for (label, source, p50, p95) in [
        ("rows", &report.rows, report.rows_p50, report.rows_p95),
        ("kpi", &report.kpi, report.kpi_p50, report.kpi_p95),
    ] {
        println!(
            "{:<5} ok={} status={} last={}ms p50={:?} p95={:?}",
            label, source.ok, source.status, source.ms, p50, p95
        );
    }
    if report.kpi_stale {
        println!("kpi snapshot is stale");
    }
    if report.kpi_mismatched {
        println!("kpi sources disagree");
    }
    Ok(())
}

async fn cmd_set_status(args: &[String]) -> Result<(), String> {
    let id: u64 = args
        .first()
        .ok_or("usage: regdesk set-status <id> <status>")?
        .parse()
        .map_err(|_| "row id must be a number".to_string())?;
    let status = parse_status(args.get(1).ok_or("usage: regdesk set-status <id> <status>")?)?;

    let config = load_config()?;
    let state = synced_state(&config).await?;
    let ctl = controller(&config, Arc::clone(&state))?;
    let actor = actor_from(args);
    ctl.save(&actor, id, &RowPatch::status(status))
        .await
        .map_err(|e| e.to_string())?;
    println!("row {} set to {}", id, status);
    Ok(())
}

async fn cmd_audit(args: &[String]) -> Result<(), String> {
    let config = load_config()?;
    let limit = match flag(args, "--limit") {
        Some(n) => n.parse().map_err(|_| format!("bad limit '{}'", n))?,
        None => regdesk::audit::DEFAULT_HISTORY_LIMIT,
    };
    let sink = audit_sink(&config)?;
    let entries = sink.recent(limit).await.map_err(|e| e.to_string())?;
    for e in &entries {
        println!(
            "{} row {} {}: '{}' -> '{}' by {}",
            e.at, e.row_id, e.field, e.old_value, e.new_value, e.actor_email
        );
    }
    println!("{} entries", entries.len());
    Ok(())
}

async fn cmd_watch() -> Result<(), String> {
    let config = load_config()?;
    let state = Arc::new(DashboardState::new(config.page_size));
    let client = FeedClient::new();
    refresh(&state, &client, &config, false).await?;
    // Runs until interrupted; each cycle re-reads the config file.
    run_live_sync(state, client).await;
    Ok(())
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let cut: String = s.chars().take(width.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
