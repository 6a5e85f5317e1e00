use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{Datelike, Days, Local, Weekday};
use tokio_util::sync::CancellationToken;
use tracing::info;

use vastraveda::config::Config;
use vastraveda::engine::{Availability, AvailabilityEngine, AvailabilityView};
use vastraveda::file_source::JsonSnapshotSource;
use vastraveda::model::{calendar_date, CalendarDate, DayState};
use vastraveda::watcher::run_snapshot_watcher;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    vastraveda::observability::init(config.metrics_port);

    let source = Arc::new(JsonSnapshotSource::open(&config.snapshot).await?);
    let product_id = match config.product {
        Some(id) => id,
        None => source
            .products()
            .await?
            .into_iter()
            .next()
            .ok_or("snapshot lists no products; set VASTRA_PRODUCT")?,
    };
    let today = config.today.unwrap_or_else(|| calendar_date(&Local::now()));

    info!("vastraveda availability for {product_id}");
    info!("  snapshot: {}", config.snapshot.display());
    info!("  season: {}", config.season);
    info!("  today: {today}");
    info!("  watch: {}", if config.watch { "enabled" } else { "disabled" });
    info!("  metrics: {}", config.metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    let engine = AvailabilityEngine::open(source.clone(), product_id, &config.season, today)?;
    let view = engine.ready().await?;
    print!("{}", render(&view, today));

    if !config.watch {
        engine.close().await;
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(run_snapshot_watcher(source.clone(), config.poll_interval, cancel.clone()));

    let mut views = engine.watch();
    views.mark_unchanged();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                print!("{}", render(&view, today));
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    cancel.cancel();
    if let Err(e) = watcher.await {
        tracing::warn!("snapshot watcher failed: {e}");
    }
    engine.close().await;
    info!("vastraveda stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("failed to register SIGTERM handler: {e}");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
}

/// Week rows from the Monday before the window to the Sunday after it.
fn render(view: &AvailabilityView, today: CalendarDate) -> String {
    let mut out = String::new();
    let window = view.window;
    let _ = writeln!(out, "\n{} .. {}  (today {today})", window.start(), window.end());

    let availability: &Availability = match (view.current(), view.last_known()) {
        (Ok(availability), _) => availability,
        (Err(e), Some(stale)) => {
            let _ = writeln!(out, "refresh failed, showing last known dates: {e}");
            stale
        }
        (Err(e), None) => {
            let _ = writeln!(out, "availability unknown: {e}");
            return out;
        }
    };

    let _ = writeln!(out, " Mo   Tu   We   Th   Fr   Sa   Su");
    let lead = u64::from(window.start().weekday().num_days_from_monday());
    let Some(mut day) = window.start().checked_sub_days(Days::new(lead)) else {
        return out;
    };
    while day <= window.end() || day.weekday() != Weekday::Mon {
        let cell = match availability.day_state(day) {
            DayState::OutOfWindow => " -- ".to_string(),
            DayState::Booked => format!("[{:>2}]", day.day()),
            DayState::Available => format!(" {:>2} ", day.day()),
        };
        out.push_str(&cell);
        out.push(if day.weekday() == Weekday::Sun { '\n' } else { ' ' });
        match day.checked_add_days(Days::new(1)) {
            Some(next) => day = next,
            None => break,
        }
    }
    let _ = writeln!(
        out,
        "{} of {} days available, [nn] booked",
        availability.available_count(),
        window.len_days()
    );
    if let Some(next) = availability.first_selectable(today) {
        let _ = writeln!(out, "next selectable: {next}");
    }
    out
}
