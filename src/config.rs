use crate::policy::ConvergencePolicy;
use indexmap::IndexMap;
use std::fs::File;
use std::path::Path;

fn default_label() -> String {
    "/status".to_string()
}

/// A resource to wait for.
#[derive(Clone, Debug, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Watch {
    /// Path segments of the resource, relative to the API URL
    pub path: Vec<String>,
    /// JSON pointer to the state label in the resource
    #[serde(default = "default_label")]
    pub label: String,
    pub policy: ConvergencePolicy,
}

#[derive(Clone, Debug, Default, PartialEq, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchFile {
    #[serde(default)]
    pub watches: IndexMap<String, Watch>,
}

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<WatchFile> {
    Ok(serde_yaml::from_reader(File::open(path)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{presets, Label};

    #[test]
    fn parse() {
        let file: WatchFile = serde_yaml::from_str(
            r#"
watches:
  database:
    path: [v1, databases, orders]
    policy:
      pending: [creating, backing-up, modifying]
      target: available
      initialDelay: 30s
      minInterval: 10s
      timeout: 20m
  old-database:
    path: [v1, databases, legacy]
    label: /state/name
    policy:
      pending: [deleting]
      minInterval: 5s
      timeout: 10m
      backoffFactor: 2.0
"#,
        )
        .unwrap();

        let names: Vec<_> = file.watches.keys().cloned().collect();
        assert_eq!(names, vec!["database", "old-database"]);

        let database = &file.watches["database"];
        assert_eq!(database.label, "/status");
        assert_eq!(database.policy, presets::db_instance_available());

        let old = &file.watches["old-database"];
        assert_eq!(old.label, "/state/name");
        assert_eq!(old.policy.target(), &Label::absent());
        assert_eq!(old.policy.backoff_factor(), 2.0);
    }

    #[test]
    fn reject_invalid_policy() {
        let result = serde_yaml::from_str::<WatchFile>(
            r#"
watches:
  broken:
    path: [x]
    policy:
      pending: [available]
      target: available
      minInterval: 1s
      timeout: 1m
"#,
        );
        assert!(result.is_err());
    }
}
