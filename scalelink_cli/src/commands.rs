//! Command implementations. Each returns `eyre::Result` and prints either
//! human text or one JSON document per result on stdout.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use eyre::{Result, WrapErr, eyre};
use scalelink_config::{CUSTOM_PROFILE_ID, Config, ScaleConfig, ScaleSet, profile_by_id};
use scalelink_core::{
    PROBE_TIMEOUT, ScaleRuntimeState, Station, StationSession, SyncApi, auto_detect, probe,
    sync_zones, unescape_control,
};
use scalelink_hardware::{SimScript, SimulatedOpener, SystemSerialOpener, list_ports};
use scalelink_remote::ApiClient;
use scalelink_traits::{Parity, SerialOpener};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;

use crate::cli::Commands;
use crate::logging::{LOG_RETENTION, prune_old_logs};
use crate::persist;

pub async fn dispatch(
    cmd: Commands,
    config_path: &Path,
    loaded: Result<Config>,
    json: bool,
) -> Result<()> {
    match cmd {
        Commands::Run { simulate, run_for } => run(loaded?, simulate, run_for, json).await,
        Commands::Verify => verify(&loaded?, json).await,
        Commands::Register { name, write } => register(loaded?, config_path, name, write, json).await,
        Commands::Ports => {
            ports(json);
            Ok(())
        }
        Commands::Detect => {
            detect(json).await;
            Ok(())
        }
        Commands::Probe {
            port,
            profile,
            simulate,
        } => probe_port(&port, &profile, simulate, json).await,
        Commands::AddScale {
            scale_id,
            port,
            profile,
            baud_rate,
            data_bits,
            parity,
            stop_bits,
            poll_command,
            delimiter,
            read_interval_ms,
            not_working,
        } => {
            let mut cfg = ScaleConfig::from_profile(&scale_id, &port, lookup_profile(&profile)?);
            if profile == CUSTOM_PROFILE_ID {
                cfg.profile_id = None;
            }
            if let Some(v) = baud_rate {
                cfg.baud_rate = v;
            }
            if let Some(v) = data_bits {
                cfg.data_bits = v;
            }
            if let Some(v) = parity {
                cfg.parity = v;
            }
            if let Some(v) = stop_bits {
                cfg.stop_bits = v;
            }
            if let Some(v) = poll_command {
                let v = unescape_control(&v);
                cfg.poll_command = (!v.is_empty()).then_some(v);
            }
            if let Some(v) = delimiter {
                cfg.delimiter = unescape_control(&v);
            }
            if let Some(v) = read_interval_ms {
                cfg.read_interval_ms = v;
            }
            cfg.working = !not_working;
            cfg.validate().wrap_err("invalid configuration")?;
            edit_scales(config_path, json, |set| {
                let id = cfg.scale_id.clone();
                set.add(cfg)?;
                Ok(format!("scale {id} added"))
            })
        }
        Commands::RemoveScale { scale_id } => edit_scales(config_path, json, |set| {
            let removed = set.remove(&scale_id)?;
            Ok(format!("scale {} removed (port {})", removed.scale_id, removed.port))
        }),
        Commands::SetWorking { scale_id, working } => edit_scales(config_path, json, |set| {
            set.set_working(&scale_id, working)?;
            let zone = if working { "in" } else { "out of" };
            Ok(format!("scale {scale_id} is now {zone} the work zone"))
        }),
        Commands::SyncZones => zones(&loaded?, json).await,
        Commands::Status => status(&loaded?, json),
    }
}

fn lookup_profile(id: &str) -> Result<&'static scalelink_config::ScaleProfile> {
    profile_by_id(id).ok_or_else(|| {
        let known: Vec<&str> = scalelink_config::PROFILES.iter().map(|p| p.id).collect();
        eyre!("unknown profile '{id}' (known: {})", known.join(", "))
    })
}

fn api_for(cfg: &Config) -> Result<ApiClient> {
    Ok(ApiClient::new(&StationSession::from(&cfg.station))?)
}

/// In-memory devices on every configured port, answering with a demo load.
fn simulated_opener(set: &ScaleSet) -> SimulatedOpener {
    let sim = SimulatedOpener::new();
    for scale in set.iter() {
        sim.attach(&scale.port, sim_script(scale));
    }
    sim
}

fn sim_script(cfg: &ScaleConfig) -> SimScript {
    match cfg.poll_command() {
        Some(cmd) => SimScript::polled(cmd, &cfg.delimiter, SimScript::demo_weights()),
        None => SimScript::continuous(
            Duration::from_millis(cfg.read_interval_ms),
            &cfg.delimiter,
            SimScript::demo_weights(),
        ),
    }
}

async fn run(cfg: Config, simulate: bool, run_for: Option<u64>, json: bool) -> Result<()> {
    cfg.validate().wrap_err("invalid configuration")?;
    if let Some(file) = cfg.logging.file.as_deref() {
        prune_old_logs(Path::new(file), LOG_RETENTION);
    }

    let api = Arc::new(api_for(&cfg)?);
    let opener: Arc<dyn SerialOpener> = if simulate {
        tracing::info!("using simulated scales");
        Arc::new(simulated_opener(&cfg.scale_set()?))
    } else {
        Arc::new(SystemSerialOpener::new())
    };
    let station = Station::builder()
        .with_config(cfg)
        .with_api(api)
        .with_opener(opener)
        .build()?;

    let mut events = station.subscribe();
    station.init().await;
    let st = station.status();
    tracing::info!(station_id = %st.station_id, scales = st.scales.len(), "acquisition started");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let deadline = async {
        match run_for {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            res = &mut ctrl_c => {
                if let Err(e) = res {
                    tracing::warn!(error = %e, "could not listen for Ctrl-C");
                }
                tracing::info!("shutdown signal received");
                break;
            }
            () = &mut deadline => break,
            ev = events.recv() => match ev {
                Ok(state) => print_state(&state, json),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "state printer fell behind");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    station.shutdown().await;
    // final states, including each scale's teardown
    loop {
        match events.try_recv() {
            Ok(state) => print_state(&state, json),
            Err(tokio::sync::broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    Ok(())
}

fn print_state(s: &ScaleRuntimeState, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(s) {
            println!("{line}");
        }
        return;
    }
    let phase = serde_json::to_value(s.phase)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    let mut line = format!(
        "{:<8} {:<16} {:<17} {:>10.3} kg {}",
        s.scale_id,
        s.port,
        phase,
        s.weight,
        if s.stable { "stable  " } else { "settling" }
    );
    line.push_str(&format!(" reads={}", s.read_count));
    if let Some(e) = &s.last_error {
        line.push_str(&format!(" error={e}"));
    }
    println!("{line}");
}

async fn verify(cfg: &Config, json: bool) -> Result<()> {
    let api = api_for(cfg)?;
    let info = api.verify_connection().await?;
    if json {
        println!("{}", json!({ "ok": true, "health": info }));
    } else {
        println!(
            "server {} reachable (status: {})",
            cfg.station.server_url,
            info.status.as_deref().unwrap_or("ok")
        );
    }
    Ok(())
}

async fn register(
    mut cfg: Config,
    path: &Path,
    name: Option<String>,
    write: bool,
    json: bool,
) -> Result<()> {
    let name = name
        .or_else(|| cfg.station.name.clone())
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| eyre!("a station name is required: pass --name or set station.name"))?;
    let reg = api_for(&cfg)?.register_station(&name).await?;

    if write {
        cfg.station.station_id = reg.station_id.clone();
        cfg.station.station_key = reg.station_key.clone();
        cfg.station.name = Some(name.clone());
        persist::save(path, &cfg)?;
    }
    if json {
        println!(
            "{}",
            json!({ "stationId": reg.station_id, "name": name, "saved": write })
        );
    } else {
        println!("registered station '{name}' as {}", reg.station_id);
        if !write {
            println!("station_key = \"{}\"", reg.station_key);
            println!("(pass --write to save these into the config file)");
        }
    }
    Ok(())
}

fn ports(json: bool) {
    let ports = list_ports();
    if json {
        println!("{}", json!(ports));
        return;
    }
    if ports.is_empty() {
        println!("no serial ports found");
    }
    for p in &ports {
        let mut line = p.path.clone();
        if let Some(m) = &p.manufacturer {
            line.push_str(&format!("  {m}"));
        }
        if let Some(sn) = &p.serial_number {
            line.push_str(&format!("  sn={sn}"));
        }
        println!("{line}");
    }
}

async fn detect(json: bool) {
    let ports: Vec<String> = list_ports().into_iter().map(|p| p.path).collect();
    let found = auto_detect(&SystemSerialOpener::new(), &ports, PROBE_TIMEOUT).await;
    if json {
        println!("{}", json!(found));
        return;
    }
    println!("{} of {} ports answered", found.len(), ports.len());
    for d in &found {
        println!("{:<16} {:<20} {:>10.3} kg  raw={:?}", d.port, d.profile_id, d.weight, d.raw);
    }
}

async fn probe_port(port: &str, profile: &str, simulate: bool, json: bool) -> Result<()> {
    let cfg = ScaleConfig::from_profile("probe", port, lookup_profile(profile)?);
    let opener: Box<dyn SerialOpener> = if simulate {
        let sim = SimulatedOpener::new();
        sim.attach(port, sim_script(&cfg));
        Box::new(sim)
    } else {
        Box::new(SystemSerialOpener::new())
    };
    let reading = probe(opener.as_ref(), &cfg, PROBE_TIMEOUT).await?;
    if json {
        println!(
            "{}",
            json!({ "port": port, "profile": profile, "weight": reading.weight, "raw": reading.raw })
        );
    } else {
        println!("{port}: {:.3} kg (raw {:?})", reading.weight, reading.raw);
    }
    Ok(())
}

/// Load (or start) the station file, apply `f` to its scale list and save.
fn edit_scales(
    path: &Path,
    json: bool,
    f: impl FnOnce(&mut ScaleSet) -> Result<String>,
) -> Result<()> {
    let mut cfg = persist::load_or_default(path)?;
    let mut set = cfg.scale_set()?;
    let message = f(&mut set)?;
    cfg.set_scales(&set);
    persist::save(path, &cfg)?;
    if json {
        println!("{}", json!({ "ok": true, "message": message, "scales": set.len() }));
    } else {
        println!("{message}");
    }
    Ok(())
}

async fn zones(cfg: &Config, json: bool) -> Result<()> {
    let set = cfg.scale_set()?;
    let api = api_for(cfg)?;
    let results = sync_zones(&api, &set).await;

    let synced = results.iter().filter(|(_, r)| r.is_ok()).count();
    if json {
        let items: Vec<_> = results
            .iter()
            .map(|(id, r)| json!({ "scaleId": id, "ok": r.is_ok(), "error": r.as_ref().err().map(ToString::to_string) }))
            .collect();
        println!("{}", json!({ "synced": synced, "total": results.len(), "results": items }));
    } else {
        for (id, r) in &results {
            match r {
                Ok(()) => println!("{id}: ok"),
                Err(e) => println!("{id}: {e}"),
            }
        }
        println!("{synced}/{} zones synced", results.len());
    }

    if synced == 0
        && let Some((_, Err(e))) = results.into_iter().next()
    {
        return Err(e.into());
    }
    Ok(())
}

fn framing(cfg: &ScaleConfig) -> String {
    let parity = match cfg.parity {
        Parity::None => 'N',
        Parity::Even => 'E',
        Parity::Odd => 'O',
    };
    format!("{} {}{}{}", cfg.baud_rate, cfg.data_bits, parity, cfg.stop_bits)
}

fn status(cfg: &Config, json: bool) -> Result<()> {
    let set = cfg.scale_set()?;
    let session = StationSession::from(&cfg.station);
    if json {
        println!(
            "{}",
            json!({
                "station": {
                    "serverUrl": cfg.station.server_url,
                    "stationId": cfg.station.station_id,
                    "name": cfg.station.name,
                    "registered": session.is_registered(),
                },
                "configured": cfg.is_configured(),
                "tuning": cfg.tuning,
                "scales": set.iter().collect::<Vec<_>>(),
            })
        );
        return Ok(());
    }

    let station_id = if cfg.station.station_id.is_empty() {
        "(unregistered)"
    } else {
        cfg.station.station_id.as_str()
    };
    println!("station  {station_id} @ {}", cfg.station.server_url);
    println!(
        "scales   {} configured, {} in work zone",
        set.len(),
        set.working().count()
    );
    for s in set.iter() {
        let poll = s
            .poll_command()
            .map(|c| format!("poll {c:?}"))
            .unwrap_or_else(|| "continuous".to_string());
        println!(
            "  {:<8} {:<16} {:<20} {:<10} {:<16} every {}ms {}",
            s.scale_id,
            s.port,
            s.profile_id.as_deref().unwrap_or("custom"),
            framing(s),
            poll,
            s.read_interval_ms,
            if s.working { "working" } else { "idle" }
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_is_compact() {
        let mut cfg = ScaleConfig::from_profile("B1", "COM1", profile_by_id("torrey-fs250").unwrap());
        assert_eq!(framing(&cfg), "9600 8N1");
        cfg.parity = Parity::Even;
        cfg.data_bits = 7;
        assert_eq!(framing(&cfg), "9600 7E1");
    }

    #[test]
    fn simulated_script_follows_framing() {
        let polled = ScaleConfig::from_profile("B1", "COM1", profile_by_id("torrey-fs250").unwrap());
        let cont =
            ScaleConfig::from_profile("B2", "COM2", profile_by_id("generic-continuous").unwrap());
        assert!(matches!(
            sim_script(&polled).mode,
            scalelink_hardware::SimMode::Polled { ref command } if command == "W\r\n"
        ));
        assert!(matches!(
            sim_script(&cont).mode,
            scalelink_hardware::SimMode::Continuous { .. }
        ));
        assert_eq!(sim_script(&cont).delimiter, "\r\n");
    }

    #[test]
    fn unknown_profile_lists_known_ones() {
        let err = lookup_profile("acme").unwrap_err().to_string();
        assert!(err.contains("torrey-fs250"));
    }
}
