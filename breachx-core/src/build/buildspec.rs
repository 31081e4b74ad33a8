use breachx_model::BuildConfig;

pub const DEFAULT_INSTALL_COMMAND: &str = "npm install";
pub const DEFAULT_BUILD_COMMAND: &str = r#"echo "No build command specified""#;

/// Render the build specification for a repository's settings.
///
/// Each command is echoed before it runs so the log stream shows which
/// step produced the output that follows.
pub fn render(config: &BuildConfig, nodejs_version: &str) -> String {
    let install = command_or(&config.install_command, DEFAULT_INSTALL_COMMAND);
    let build = command_or(&config.build_command, DEFAULT_BUILD_COMMAND);

    format!(
        "version: 0.2\n\
         \n\
         phases:\n\
         \x20 install:\n\
         \x20   runtime-versions:\n\
         \x20     nodejs: {nodejs_version}\n\
         \x20   commands:\n\
         {install}\n\
         \x20 build:\n\
         \x20   commands:\n\
         {build}\n\
         \x20 post_build:\n\
         \x20   commands:\n\
         \x20     - echo \"Build completed at $(date)\"\n",
        install = format_command(install),
        build = format_command(build),
    )
}

fn command_or<'a>(configured: &'a str, fallback: &'a str) -> &'a str {
    let trimmed = configured.trim();
    if trimmed.is_empty() { fallback } else { trimmed }
}

fn format_command(cmd: &str) -> String {
    format!("      - echo \"Running: {cmd}\" && {cmd}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use breachx_model::RepositoryId;

    #[test]
    fn defaults_apply_to_blank_commands() {
        let mut config = BuildConfig::empty(RepositoryId::new("7").unwrap());
        config.install_command = "   ".into();
        let spec = render(&config, "16");

        assert!(spec.starts_with("version: 0.2\n\nphases:\n  install:\n"));
        assert!(spec.contains("      nodejs: 16\n"));
        assert!(spec.contains(
            "      - echo \"Running: npm install\" && npm install\n"
        ));
        assert!(spec.contains(
            "      - echo \"Running: echo \"No build command specified\"\" && echo \"No build command specified\"\n"
        ));
        assert!(spec.ends_with(
            "  post_build:\n    commands:\n      - echo \"Build completed at $(date)\"\n"
        ));
    }

    #[test]
    fn configured_commands_are_echoed_then_run() {
        let mut config = BuildConfig::empty(RepositoryId::new("7").unwrap());
        config.install_command = "yarn".into();
        config.build_command = "yarn build".into();
        let spec = render(&config, "18");
        assert!(spec.contains("      - echo \"Running: yarn\" && yarn\n"));
        assert!(spec.contains(
            "  build:\n    commands:\n      - echo \"Running: yarn build\" && yarn build\n"
        ));
    }
}
