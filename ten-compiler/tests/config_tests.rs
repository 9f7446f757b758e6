use ten_compiler::{Config, ConfigError};

#[test]
fn json_settings_merge_over_defaults() {
    let (config, warnings) = Config::from_json(
        r#"{"namespace": "TPL", "tabSize": 4.4, "indent": 3, "parseCDATA": true, "templateRoot": "views"}"#,
    )
    .unwrap();
    assert!(warnings.is_empty());
    assert_eq!(config.namespace, "tpl");
    assert_eq!(config.tab_size, 4);
    assert_eq!(config.indent, 3);
    assert!(config.parse_cdata);
    assert!(config.remove_xml_declaration);
    assert_eq!(config.template_root.to_str(), Some("views"));
}

#[test]
fn invalid_values_fall_back_with_warnings() {
    let (config, warnings) =
        Config::from_json(r#"{"namespace": "a b", "tabSize": 0, "indent": "x", "cache": 1}"#)
            .unwrap();
    let messages: Vec<_> = warnings.iter().map(|w| w.message.as_str()).collect();
    assert_eq!(
        messages,
        vec![
            "Invalid value 1 of setting \"cache\".",
            "Invalid namespace.",
            "Invalid tab size.",
            "Invalid indent.",
        ]
    );
    assert_eq!(config, Config::default());
}

#[test]
fn fractions_below_one_are_rejected_before_rounding() {
    let (config, warnings) = Config::from_json(r#"{"tabSize": 0.6, "indent": 1.4}"#).unwrap();
    let messages: Vec<_> = warnings.iter().map(|w| w.message.as_str()).collect();
    assert_eq!(messages, vec!["Invalid tab size."]);
    assert_eq!(config.tab_size, Config::default().tab_size);
    assert_eq!(config.indent, 1);
}

#[test]
fn non_object_payload_is_fatal() {
    assert!(matches!(Config::from_json("[1]"), Err(ConfigError::NotAnObject)));
    assert!(matches!(Config::from_json("{"), Err(ConfigError::Syntax(_))));
}
