//! Config file resolution against a scratch config directory.

use std::fs;

use pretty_assertions::assert_eq;
use wgquick::cli::resolve_config_path;
use wgquick::config::load_config;
use wgquick::WgQuickError;

const CONFIG: &str = "[Interface]\n\
                      PrivateKey = yAnz5TF+lXXJte14tji3zlMNq+hd2rYUIgJBgB3fBmk=\n\
                      Address = 10.0.0.1/24\n";

#[test]
fn test_interface_name_resolves_into_config_dir() {
    let config_dir = tempfile::tempdir().unwrap();
    let path = config_dir.path().join("wg0.conf");
    fs::write(&path, CONFIG).unwrap();

    let target = resolve_config_path("wg0", None, config_dir.path()).unwrap();

    assert_eq!(target.iface, "wg0");
    assert_eq!(target.config_path, path);
    let cfg = load_config(&target.config_path).unwrap();
    assert_eq!(cfg.address.len(), 1);
}

#[test]
fn test_iface_flag_overrides_name() {
    let config_dir = tempfile::tempdir().unwrap();
    fs::write(config_dir.path().join("office.conf"), CONFIG).unwrap();

    let target = resolve_config_path("office", Some("wg5"), config_dir.path()).unwrap();

    assert_eq!(target.iface, "wg5");
    assert_eq!(target.config_path, config_dir.path().join("office.conf"));
}

#[test]
fn test_existing_file_is_used_directly() {
    let scratch = tempfile::tempdir().unwrap();
    let path = scratch.path().join("home.conf");
    fs::write(&path, CONFIG).unwrap();
    let unused_dir = tempfile::tempdir().unwrap();

    let target = resolve_config_path(path.to_str().unwrap(), None, unused_dir.path()).unwrap();
    assert_eq!(target.iface, "home");
    assert_eq!(target.config_path, path);

    let target =
        resolve_config_path(path.to_str().unwrap(), Some("wg1"), unused_dir.path()).unwrap();
    assert_eq!(target.iface, "wg1");
}

#[test]
fn test_missing_config_is_not_found() {
    let config_dir = tempfile::tempdir().unwrap();

    let err = resolve_config_path("wg9", None, config_dir.path()).unwrap_err();

    assert!(matches!(err, WgQuickError::NotFound { .. }));
    assert!(err.to_string().contains("wg9.conf"));
}
