use clap::Parser;
use minitel_bridge::cli::Cli;
use minitel_bridge::profile::{DEFAULT_PROFILE, PROFILE_FILE, load_profile, profile_path};
use minitel_bridge::startup::{
    DEFAULT_PROBE_CYCLES, VAULT_FILE, choose_port, resolve_link, simulated_settings, vault_path,
};
use minitel_core::{SessionError, SessionSettings, SettingsStore, ThrottlePolicy, Vault};
use minitel_io::{BaudRate, LinkConfig, LinkProbe, ScriptedLink};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn fast_probe(candidates: Vec<LinkConfig>) -> LinkProbe {
    LinkProbe::new(candidates).with_confirm_timeout(Duration::from_millis(20))
}

fn scratch_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("minitel-bridge-{}-{}", std::process::id(), name))
}

// ============================================================================
// CLI Tests
// ============================================================================

#[test]
fn test_cli_defaults() {
    let cli = Cli::try_parse_from(["minitel-gpt"]).unwrap();
    assert!(!cli.simulate);
    assert!(!cli.debug);
    assert!(!cli.no_stream);
    assert_eq!(cli.port, None);
    assert_eq!(cli.probe_cycles, DEFAULT_PROBE_CYCLES);
    assert_eq!(cli.base_url, minitel_neural::DEFAULT_BASE_URL);
    assert_eq!(cli.log_filter(), "info");
}

#[test]
fn test_cli_flags() {
    let cli = Cli::try_parse_from([
        "minitel-gpt",
        "--simulate",
        "--port",
        "/dev/ttyUSB0",
        "--no-stream",
        "--debug",
        "--model",
        "gpt-4o",
        "--probe-cycles",
        "5",
        "--vault",
        "/tmp/v.db",
    ])
    .unwrap();
    assert!(cli.simulate);
    assert_eq!(cli.port.as_deref(), Some("/dev/ttyUSB0"));
    assert_eq!(cli.probe_cycles, 5);
    assert_eq!(cli.vault, Some(PathBuf::from("/tmp/v.db")));
    assert_eq!(cli.log_filter(), "debug");
}

#[test]
fn test_cli_overrides_saved_settings() {
    let cli = Cli::try_parse_from(["minitel-gpt", "--no-stream", "-m", "gpt-4o", "--debug"]).unwrap();
    let mut settings = SessionSettings::default();
    cli.apply(&mut settings);
    assert_eq!(settings.model, "gpt-4o");
    assert!(!settings.stream);
    assert!(settings.debug);
}

#[test]
fn test_cli_keeps_saved_model_when_not_given() {
    let cli = Cli::try_parse_from(["minitel-gpt"]).unwrap();
    let mut settings = SessionSettings {
        model: "saved-model".to_string(),
        ..SessionSettings::default()
    };
    cli.apply(&mut settings);
    assert_eq!(settings.model, "saved-model");
    assert!(settings.stream);
}

#[test]
fn test_cli_rejects_bad_cycles() {
    assert!(Cli::try_parse_from(["minitel-gpt", "--probe-cycles", "many"]).is_err());
}

// ============================================================================
// Profile Tests
// ============================================================================

#[test]
fn test_profile_path_precedence() {
    let explicit = Path::new("/etc/minitel/profile.txt");
    let config = Path::new("/home/u/.config/minitel-gpt");
    assert_eq!(profile_path(Some(explicit), Some(config)), explicit);
    assert_eq!(profile_path(None, Some(config)), config.join(PROFILE_FILE));
    assert_eq!(profile_path(None, None), PathBuf::from(PROFILE_FILE));
}

#[test]
fn test_profile_missing_uses_default() {
    let path = scratch_file("missing-profile.txt");
    let _ = std::fs::remove_file(&path);
    assert_eq!(load_profile(&path), DEFAULT_PROFILE);
}

#[test]
fn test_profile_read_and_trimmed() {
    let path = scratch_file("profile.txt");
    std::fs::write(&path, "\n  Sois poli.  \n").unwrap();
    assert_eq!(load_profile(&path), "Sois poli.");
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_profile_blank_uses_default() {
    let path = scratch_file("blank-profile.txt");
    std::fs::write(&path, "   \n").unwrap();
    assert_eq!(load_profile(&path), DEFAULT_PROFILE);
    std::fs::remove_file(&path).unwrap();
}

#[test]
fn test_default_profile_is_plain_text() {
    assert!(DEFAULT_PROFILE.is_ascii());
    assert!(DEFAULT_PROFILE.contains("40 colonnes"));
}

// ============================================================================
// Startup Tests
// ============================================================================

#[test]
fn test_vault_path_precedence() {
    let data = Path::new("/home/u/.local/share/minitel-gpt");
    assert_eq!(
        vault_path(Some(Path::new("x.db")), Some(data)),
        PathBuf::from("x.db")
    );
    assert_eq!(vault_path(None, Some(data)), data.join(VAULT_FILE));
    assert_eq!(vault_path(None, None), PathBuf::from(VAULT_FILE));
}

#[test]
fn test_choose_port() {
    let ports = vec!["/dev/cu.usbserial".to_string(), "/dev/ttyS0".to_string()];
    assert_eq!(
        choose_port(Some("COM3"), Some("/dev/ttyS0"), &ports).as_deref(),
        Some("COM3")
    );
    assert_eq!(
        choose_port(None, Some("/dev/ttyS0"), &ports).as_deref(),
        Some("/dev/ttyS0")
    );
    assert_eq!(
        choose_port(None, Some("/dev/gone"), &ports).as_deref(),
        Some("/dev/cu.usbserial")
    );
    assert_eq!(
        choose_port(None, Some("/dev/ttyUSB9"), &[]).as_deref(),
        Some("/dev/ttyUSB9")
    );
    assert_eq!(choose_port(None, None, &[]), None);
}

#[test]
fn test_simulated_settings() {
    let mut saved = SessionSettings::default();
    saved.port = Some("/dev/ttyUSB0".to_string());
    saved.model = "gpt-4o".to_string();
    let settings = simulated_settings(saved);
    assert_eq!(settings.link, LinkConfig::seven_e_one(BaudRate::B1200).confirm());
    assert_eq!(settings.throttle, ThrottlePolicy::immediate());
    assert!(!settings.local_echo);
    assert_eq!(settings.port, None);
    assert_eq!(settings.model, "gpt-4o");
}

#[test]
fn test_resolve_link_uses_saved_config() {
    let saved = LinkConfig::eight_n_one(BaudRate::B9600).confirm();
    let mut link = ScriptedLink::new();
    let mut probe = fast_probe(LinkConfig::candidates());
    let mut settings = SessionSettings::default();
    let mut vault = Vault::in_memory().unwrap();

    let config = resolve_link(&mut link, Some(saved), &mut probe, 1, &mut settings, &mut vault).unwrap();

    assert_eq!(config, saved);
    assert_eq!(settings.link, saved);
    assert!(link.opens().is_empty());
    assert!(probe.tried().is_empty());
}

#[test]
fn test_resolve_link_probes_and_persists() {
    let candidates = vec![
        LinkConfig::seven_e_one(BaudRate::B1200),
        LinkConfig::eight_n_one(BaudRate::B1200),
        LinkConfig::seven_e_one(BaudRate::B4800),
    ];
    let mut link = ScriptedLink::new();
    link.respond_on_open(2, b"TEST 4800 7E1", b"y\r");
    let mut probe = fast_probe(candidates);
    let mut settings = SessionSettings::default();
    settings.port = Some("/dev/ttyUSB0".to_string());
    let mut vault = Vault::in_memory().unwrap();

    let config = resolve_link(&mut link, None, &mut probe, 1, &mut settings, &mut vault).unwrap();

    let expected = LinkConfig::seven_e_one(BaudRate::B4800).confirm();
    assert_eq!(config, expected);
    let stored = vault.load_settings().unwrap();
    assert_eq!(stored.link, Some(expected));
    assert_eq!(stored.settings.port.as_deref(), Some("/dev/ttyUSB0"));
}

#[test]
fn test_resolve_link_exhausted() {
    let mut link = ScriptedLink::new();
    let mut probe = fast_probe(vec![LinkConfig::seven_e_one(BaudRate::B1200)]);
    let mut settings = SessionSettings::default();
    let mut vault = Vault::in_memory().unwrap();

    let err = resolve_link(&mut link, None, &mut probe, 2, &mut settings, &mut vault).unwrap_err();

    assert!(matches!(err, SessionError::ProbeExhausted { cycles: 2 }));
    assert_eq!(vault.load_settings().unwrap().link, None);
    assert_eq!(probe.tried().len(), 2);
}

#[test]
fn test_resolve_link_port_unavailable() {
    let mut link = ScriptedLink::new();
    link.unavailable(true);
    let mut probe = fast_probe(LinkConfig::candidates());
    let mut settings = SessionSettings::default();
    let mut vault = Vault::in_memory().unwrap();

    let err = resolve_link(&mut link, None, &mut probe, 1, &mut settings, &mut vault).unwrap_err();
    assert!(err.is_link_lost());
}
