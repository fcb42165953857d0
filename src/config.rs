use serde::Deserialize;
use std::path::PathBuf;

use crate::aggregate::AggregateOptions;
use crate::table::ListFormat;

/// A batch of aggregation tasks, loaded from YAML.
#[derive(Deserialize, Debug, Clone)]
pub struct RunConfig {
    pub description: Option<String>,
    pub tasks: Vec<TaskConfig>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TaskConfig {
    pub description: Option<String>,
    pub input_dir: PathBuf,
    pub output: PathBuf,
    pub prefix: Option<String>,
    pub extension: Option<String>,
    pub include_profile_dirs: Option<bool>,
    pub list_separator: Option<String>,
}

impl TaskConfig {
    pub fn options(&self) -> AggregateOptions {
        let mut options = AggregateOptions::default().with_list_format(list_format(self.list_separator.as_deref()));
        if let Some(prefix) = &self.prefix {
            options = options.with_prefix(prefix.as_str());
        }
        if let Some(extension) = &self.extension {
            options = options.with_extension(extension.as_str());
        }
        if let Some(include) = self.include_profile_dirs {
            options = options.include_profile_dirs(include);
        }
        options
    }
}

/// No separator keeps lists as JSON array text.
pub fn list_format(separator: Option<&str>) -> ListFormat {
    separator.map_or(ListFormat::Json, |sep| ListFormat::Joined(sep.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_overrides_defaults() {
        let yaml = r#"
description: nightly
tasks:
  - input_dir: downloads/someone
    output: exports/someone.csv
  - description: flat
    input_dir: flat
    output: flat.csv
    prefix: ""
    extension: .meta
    include_profile_dirs: false
    list_separator: "; "
"#;
        let run: RunConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(run.tasks.len(), 2);

        let defaults = run.tasks[0].options();
        assert_eq!(defaults.file_prefix, "custom_metadata");
        assert_eq!(defaults.list_format, ListFormat::Json);

        let flat = run.tasks[1].options();
        assert_eq!(flat.file_prefix, "");
        assert_eq!(flat.file_extension, "meta");
        assert!(!flat.include_profile_dirs);
        assert_eq!(flat.list_format, ListFormat::Joined("; ".to_string()));
    }
}
