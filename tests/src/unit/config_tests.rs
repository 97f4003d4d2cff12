use relay_core::{HttpTransport, ServerSettings};
use std::fs;
use tempfile::TempDir;

#[test]
fn file_settings_drive_the_transport_base_url() {
    let temp_dir = TempDir::new().expect("temp dir");
    let path = temp_dir.path().join("relay.yaml");
    fs::write(
        &path,
        "server:\n  host: 192.168.1.20\n  port: 4200\n  password: pw\n",
    )
    .expect("write config");

    let settings = ServerSettings::from_file(&path).expect("settings");
    let http = HttpTransport::new(&settings).expect("transport");
    assert_eq!(http.base_url(), "http://192.168.1.20:4200");
    let request = http.build_health().expect("request");
    assert_eq!(request.url().as_str(), "http://192.168.1.20:4200/global/health");
    assert!(request.headers().contains_key("authorization"));
}

#[test]
fn empty_file_falls_back_to_defaults() {
    let temp_dir = TempDir::new().expect("temp dir");
    let path = temp_dir.path().join("relay.yaml");
    fs::write(&path, "").expect("write config");
    let settings = ServerSettings::from_file(&path).expect("settings");
    assert_eq!(settings, ServerSettings::default());
}
