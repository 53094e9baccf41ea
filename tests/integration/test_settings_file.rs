//! Settings files feeding the engine.

use crate::common::{TestWorkspace, planar, sample_settings};
use links_cluster::exit_code::ExitCode;
use links_cluster::{ClusterError, ConfigError, LinksCluster, Settings};

#[test]
fn test_engine_built_from_settings_file() {
    let workspace = TestWorkspace::new();
    let path = workspace.add_file(".links-cluster/settings.toml", sample_settings::CUSTOM);

    let settings = Settings::load_from(&path).unwrap();
    assert_eq!(settings.clustering.cluster_similarity_threshold, 0.5);
    assert_eq!(settings.clustering.subcluster_similarity_threshold, 0.9);
    // Not in the file: default
    assert_eq!(settings.clustering.pair_similarity_maximum, 1.0);

    let mut engine = LinksCluster::new(settings.clustering).unwrap();
    engine.predict(&planar(0.0), Some(0.0)).unwrap();
    engine.predict(&planar(1.0), Some(5.0)).unwrap();
    engine.predict(&planar(2.0), Some(25.0)).unwrap();

    assert_eq!(engine.get_all_vectors().len(), 3);
    // 20s idle exceeds the 10s threshold from the file
    assert_eq!(engine.conversation_list(0).unwrap().len(), 2);
}

#[test]
fn test_invalid_settings_file_is_a_config_error() {
    let workspace = TestWorkspace::new();
    let path = workspace.add_file("settings.toml", sample_settings::INVALID_THRESHOLD);

    let err = Settings::load_from(&path).unwrap_err();
    assert!(matches!(
        err,
        ConfigError::Invalid(ClusterError::InvalidConfig { .. })
    ));
    assert_eq!(ExitCode::from_config_error(&err), ExitCode::ConfigError);
}

#[test]
fn test_saved_settings_round_trip_through_engine() {
    let workspace = TestWorkspace::new();
    let path = workspace.path().join("nested").join("settings.toml");

    let mut settings = Settings::default();
    settings.clustering.conversation_threshold = 12.5;
    settings.save(&path).unwrap();

    let loaded = Settings::load_from(&path).unwrap();
    let engine = LinksCluster::new(loaded.clustering).unwrap();
    assert_eq!(engine.config().conversation_threshold, 12.5);
}
