use seed_domain::config::Config;

#[test]
fn default_max_iterations_is_fifty() {
    let config = Config::default();
    assert_eq!(config.runtime.max_iterations, 50);
}

#[test]
fn toml_override_of_runtime_section_parses() {
    let toml_str = r#"
[runtime]
max_iterations = 10
max_concurrent_runtimes = 2
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.runtime.max_iterations, 10);
    assert_eq!(config.runtime.max_concurrent_runtimes, 2);
    // unspecified sections still take their defaults
    assert_eq!(config.tools.command_timeout_secs, 30);
}

#[test]
fn partial_tools_section_keeps_other_defaults() {
    let toml_str = r#"
[tools]
command_timeout_secs = 5
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.tools.command_timeout_secs, 5);
    assert_eq!(config.tools.output_byte_cap, 64 * 1024);
}
