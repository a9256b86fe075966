use crate::{
    config::Config,
    error::{Error, Result},
};
use serde::Serialize;
use std::fs;
use tera::{Context, Tera};

const BUILTIN_NAME: &str = "system_prompt";

#[derive(Serialize)]
struct PromptContext<'a> {
    target_language: &'a str,
}

/// Renders the system instruction sent with every request.
///
/// The text is rendered once when the pipeline starts; every worker shares
/// the resulting string.
pub(crate) struct PromptBuilder {
    tera: Tera,
    template_name: String,
}

impl PromptBuilder {
    /// Registers the built-in template and, if configured, the user's override.
    ///
    /// # Errors
    ///
    /// Returns an error if the override cannot be read or fails to parse.
    pub(crate) fn new(config: &Config) -> Result<Self> {
        let mut tera = Tera::default();

        tera.add_raw_template(BUILTIN_NAME, include_str!("../templates/system_prompt.tera"))
            .map_err(|e| Error::template(BUILTIN_NAME, e))?;

        let template_name = match config.prompt_template {
            Some(ref path) => {
                let name = path.display().to_string();
                let source = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
                tera.add_raw_template(&name, &source)
                    .map_err(|e| Error::template(&name, e))?;
                name
            }
            None => BUILTIN_NAME.to_string(),
        };

        Ok(Self {
            tera,
            template_name,
        })
    }

    /// Renders the instruction for `target_language`.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering fails.
    pub(crate) fn render(&self, target_language: &str) -> Result<String> {
        let context = Context::from_serialize(PromptContext { target_language })
            .map_err(|e| Error::template(&self.template_name, e))?;

        let rendered = self
            .tera
            .render(&self.template_name, &context)
            .map_err(|e| Error::template(&self.template_name, e))?;

        Ok(rendered.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    fn config_for(temp: &assert_fs::TempDir) -> Config {
        Config::builder()
            .input_dir(temp.path())
            .output_dir(temp.path().with_extension("out"))
            .dry_run(true)
            .build()
            .unwrap()
    }

    #[test]
    fn test_builtin_prompt_default_language() {
        let temp = assert_fs::TempDir::new().unwrap();
        let builder = PromptBuilder::new(&config_for(&temp)).unwrap();
        let prompt = builder.render("Simplified Chinese").unwrap();

        assert!(prompt.starts_with("# Role: Professional Technical Translator"));
        assert!(prompt.contains("**Simplified Chinese**"));
        assert!(prompt.contains("FILE_PATH:"));
        assert!(prompt.contains("快速入门指南"));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn test_builtin_prompt_other_language() {
        let temp = assert_fs::TempDir::new().unwrap();
        let builder = PromptBuilder::new(&config_for(&temp)).unwrap();
        let prompt = builder.render("Japanese").unwrap();

        assert!(prompt.contains("**Japanese**"));
        assert!(!prompt.contains("快速入门指南"));
    }

    #[test]
    fn test_custom_prompt_template() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template = temp.child("prompt.tera");
        template
            .write_str("Translate into {{ target_language }}. Keep FILE_PATH.")
            .unwrap();

        let config = Config::builder()
            .input_dir(temp.path())
            .output_dir(temp.path().with_extension("out"))
            .prompt_template(template.path())
            .dry_run(true)
            .build()
            .unwrap();

        let prompt = PromptBuilder::new(&config).unwrap().render("German").unwrap();
        assert_eq!(prompt, "Translate into German. Keep FILE_PATH.");
    }

    #[test]
    fn test_invalid_custom_template() {
        let temp = assert_fs::TempDir::new().unwrap();
        let template = temp.child("prompt.tera");
        template.write_str("{% if %}").unwrap();

        let config = Config::builder()
            .input_dir(temp.path())
            .output_dir(temp.path().with_extension("out"))
            .prompt_template(template.path())
            .dry_run(true)
            .build()
            .unwrap();

        let result = PromptBuilder::new(&config);
        assert!(matches!(result, Err(Error::Template { .. })));
    }
}
