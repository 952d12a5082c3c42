//! Loading and atomically rewriting the station file.

use std::fs;
use std::io::Write;
use std::path::Path;

use eyre::{Result, WrapErr};
use scalelink_config::Config;

/// Write `bytes` to a sibling temp file, fsync, then rename over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let tmp = path.with_extension("toml.new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

pub fn load(path: &Path) -> Result<Config> {
    scalelink_config::load_file(path)
}

/// Like `load`, but a missing file yields an empty config so edit commands
/// can create it.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load(path)
    } else {
        Ok(Config::default())
    }
}

pub fn save(path: &Path, cfg: &Config) -> Result<()> {
    let text = cfg.to_toml()?;
    write_atomic(path, text.as_bytes())
        .wrap_err_with(|| format!("write config {}", path.display()))?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_load_keeps_station_and_scales() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etc").join("scalelink.toml");
        assert!(load(&path).is_err());

        let mut cfg = load_or_default(&path).unwrap();
        cfg.station.server_url = "http://localhost:8080".into();
        cfg.station.station_id = "st-9".into();
        let set = scalelink_config::ScaleSet::from_configs([scalelink_config::ScaleConfig::from_profile(
            "B1",
            "/dev/ttyUSB0",
            scalelink_config::profile_by_id("torrey-l-eq").unwrap(),
        )])
        .unwrap();
        cfg.set_scales(&set);
        save(&path, &cfg).unwrap();

        assert!(!path.with_extension("toml.new").exists());
        let back = load(&path).unwrap();
        assert_eq!(back.station.station_id, "st-9");
        assert_eq!(back.scale_set().unwrap(), set);
    }
}
