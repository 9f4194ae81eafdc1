use std::io::Write;

use super::*;
use crate::cache::FieldKind;

fn raw_with_base_url(url: &str) -> RawSettings {
    let mut raw = RawSettings::default();
    raw.api.base_url = Some(url.to_string());
    raw
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = raw_with_base_url("https://api.example.com/v1");
    raw.logging.level = Some("info".to_string());
    raw.api.timeout_seconds = Some(10);

    let overrides = Overrides {
        log_level: Some("debug".to_string()),
        api_base_url: Some("https://staging.example.com/api".to_string()),
        api_timeout_seconds: Some(3),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(
        settings.api.base_url.as_str(),
        "https://staging.example.com/api/"
    );
    assert_eq!(settings.api.timeout, Duration::from_secs(3));
}

#[test]
fn cache_defaults_apply_when_table_is_missing() {
    let settings =
        Settings::from_raw(raw_with_base_url("http://localhost:8080/")).expect("valid settings");

    assert_eq!(settings.cache, CacheConfig::default());
    assert_eq!(settings.api.timeout, Duration::from_secs(DEFAULT_API_TIMEOUT_SECS));
    assert!(settings.api.token.is_none());
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = raw_with_base_url("http://localhost:8080/");
    let overrides = Overrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn missing_base_url_is_rejected() {
    let error = Settings::from_raw(RawSettings::default()).unwrap_err();
    assert!(matches!(
        error,
        LoadError::Invalid {
            key: "api.base_url",
            ..
        }
    ));
}

#[test]
fn zero_timeout_is_rejected() {
    let mut raw = raw_with_base_url("http://localhost:8080/");
    raw.api.timeout_seconds = Some(0);

    let error = Settings::from_raw(raw).unwrap_err();
    assert!(matches!(
        error,
        LoadError::Invalid {
            key: "api.timeout_seconds",
            ..
        }
    ));
}

#[test]
fn duplicate_model_types_are_rejected() {
    let mut raw = raw_with_base_url("http://localhost:8080/");
    let model = RawModelSettings {
        model_type: "Post".to_string(),
        resource: None,
        single_fetch: None,
        fields: Vec::new(),
    };
    raw.models = vec![model.clone(), model];

    let error = Settings::from_raw(raw).unwrap_err();
    assert!(matches!(
        error,
        LoadError::Invalid {
            key: "models.model_type",
            ..
        }
    ));
}

#[test]
fn config_file_models_and_cache_table_are_loaded() {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config file");
    write!(
        file,
        r#"
[logging]
level = "warn"

[cache]
default_list = "everything"
auto_load = false

[api]
base_url = "http://localhost:9000/api"

[[models]]
model_type = "Post"
resource = "/posts/"
single_fetch = false

[[models.fields]]
name = "title"
kinds = ["string"]
required = true

[[models.fields]]
name = "author"
api_field = "authorId"
kinds = ["link", "null"]
sub_type = "User"

[[models]]
model_type = "User"
"#
    )
    .expect("write config");

    let cli = CliArgs::parse_from([
        "normcache-cli",
        "--config-file",
        file.path().to_str().expect("utf-8 path"),
        "--log-level",
        "trace",
        "types",
    ]);
    let settings = load(&cli).expect("valid settings");

    assert_eq!(settings.logging.level, LevelFilter::TRACE);
    assert_eq!(settings.cache.default_list, "everything");
    assert!(!settings.cache.auto_load);
    assert_eq!(settings.api.base_url.as_str(), "http://localhost:9000/api/");

    let post = &settings.models[0];
    assert_eq!(post.resource, "posts");
    assert!(!post.single_fetch);
    let author = post.metadata.get("author").expect("author field");
    assert_eq!(author.api_key(), "authorId");
    assert_eq!(author.kinds, vec![FieldKind::Link, FieldKind::Null]);
    assert_eq!(author.sub_type.as_deref(), Some("User"));

    let user = &settings.models[1];
    assert_eq!(user.resource, "user");
    assert!(user.single_fetch);
    assert!(user.metadata.fields.is_empty());
}

#[test]
fn parse_get_arguments() {
    let args = CliArgs::parse_from(["normcache-cli", "--log-json", "true", "get", "Post", "p1"]);

    assert_eq!(args.overrides.log_json, Some(true));
    match args.command {
        Command::Get(get) => {
            assert_eq!(get.model_type, "Post");
            assert_eq!(get.id, "p1");
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn parse_list_arguments() {
    let args = CliArgs::parse_from(["normcache-cli", "list", "Post", "--name", "drafts"]);

    match args.command {
        Command::List(list) => {
            assert_eq!(list.model_type, "Post");
            assert_eq!(list.name.as_deref(), Some("drafts"));
        }
        other => panic!("unexpected command: {other:?}"),
    }
}
