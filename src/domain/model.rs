use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One capistrano deploy as written to `capatross_logs/<capatross_id>.json`.
///
/// Kept as a raw JSON object so fields this tool does not know about survive
/// a rewrite.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeployLog {
    pub data: Map<String, Value>,
}

impl DeployLog {
    pub fn capatross_id(&self) -> String {
        self.display_field("capatross_id")
    }

    pub fn deployed_revision(&self) -> String {
        self.display_field("deployed_revision")
    }

    pub fn start(&self) -> String {
        self.display_field("start")
    }

    pub fn location(&self) -> String {
        self.display_field("location")
    }

    pub fn success(&self) -> bool {
        truthy(self.data.get("success"))
    }

    pub fn finish_posted(&self) -> bool {
        truthy(self.data.get("finish_posted"))
    }

    pub fn mark_posted(&mut self) {
        self.data
            .insert("finish_posted".to_string(), Value::Bool(true));
    }

    pub fn mark_from_cli(&mut self) {
        self.data.insert("from_cli".to_string(), Value::Bool(true));
    }

    /// Drops the captured deploy output, which can be megabytes.
    pub fn strip_output(&mut self) {
        self.data.remove("deploy_log");
    }

    /// One line for `capatross list`.
    pub fn summary(&self) -> String {
        if self.success() {
            format!(
                "{} : Revision: {} deployed at {} to {}",
                self.capatross_id(),
                self.deployed_revision(),
                self.start(),
                self.location()
            )
        } else {
            format!(
                "{} : Deploy failed at {} to {}",
                self.capatross_id(),
                self.start(),
                self.location()
            )
        }
    }

    fn display_field(&self, key: &str) -> String {
        match self.data.get(key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

impl From<Map<String, Value>> for DeployLog {
    fn from(data: Map<String, Value>) -> Self {
        Self { data }
    }
}

/// Ruby truthiness: only `null` and `false` are false.
pub fn truthy(value: Option<&Value>) -> bool {
    !matches!(value, None | Some(Value::Null) | Some(Value::Bool(false)))
}

fn deserialize_truthy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(truthy(Some(&value)))
}

/// Byte counts arrive as numbers or numeric strings; anything else is unknown.
fn deserialize_size<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct DumpRequest<'a> {
    pub appname: &'a str,
    pub dbtype: &'a str,
    pub data_key: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct CopyRequest<'a> {
    pub appname: &'a str,
    pub data_key: &'a str,
}

/// Reply to a dump or copy request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(default, deserialize_with = "deserialize_truthy")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ApiResponse {
    pub fn reason(&self) -> &str {
        self.message.as_deref().unwrap_or("unknown")
    }
}

/// Metadata about the most recent snapshot of an application database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DumpInfo {
    #[serde(default, deserialize_with = "deserialize_truthy")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    /// Remote path of the gzip-compressed dump.
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default, deserialize_with = "deserialize_size")]
    pub size: Option<u64>,
    #[serde(default)]
    pub last_dumped_at: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DumpInfo {
    pub fn reason(&self) -> &str {
        self.message.as_deref().unwrap_or("unknown")
    }
}

/// Outcome of posting a deploy log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostOutcome {
    pub status: u16,
    pub success: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn log(value: Value) -> DeployLog {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_summary_for_successful_deploy() {
        let deploy = log(json!({
            "capatross_id": "a1b2",
            "success": true,
            "deployed_revision": "deadbeef",
            "start": "2013-05-01 12:00:00 -0400",
            "location": "production"
        }));
        assert_eq!(
            deploy.summary(),
            "a1b2 : Revision: deadbeef deployed at 2013-05-01 12:00:00 -0400 to production"
        );
    }

    #[test]
    fn test_summary_for_failed_deploy() {
        let deploy = log(json!({
            "capatross_id": "a1b2",
            "success": false,
            "start": "2013-05-01",
            "location": "staging"
        }));
        assert_eq!(deploy.summary(), "a1b2 : Deploy failed at 2013-05-01 to staging");
    }

    #[test]
    fn test_truthiness_follows_ruby() {
        assert!(truthy(Some(&json!(true))));
        assert!(truthy(Some(&json!(0))));
        assert!(truthy(Some(&json!("false"))));
        assert!(!truthy(Some(&json!(false))));
        assert!(!truthy(Some(&Value::Null)));
        assert!(!truthy(None));
    }

    #[test]
    fn test_unknown_fields_survive_round_trip() {
        let mut deploy = log(json!({"capatross_id": "x", "deployer": "jay", "deploy_log": "..."}));
        deploy.mark_posted();
        deploy.strip_output();

        let rendered = serde_json::to_value(&deploy).unwrap();
        assert_eq!(rendered["deployer"], "jay");
        assert_eq!(rendered["finish_posted"], true);
        assert!(rendered.get("deploy_log").is_none());
    }

    #[test]
    fn test_dump_info_defaults() {
        let info: DumpInfo = serde_json::from_value(json!({"success": false})).unwrap();
        assert_eq!(info.reason(), "unknown");
        assert!(info.file.is_none());

        let info: DumpInfo = serde_json::from_value(json!({
            "success": true,
            "file": "/data/dumps/darmok_production.sql.gz",
            "size": 1048576,
            "last_dumped_at": "2013-05-01T12:00:00Z",
            "dbname": "prod_darmok"
        }))
        .unwrap();
        assert_eq!(info.size, Some(1048576));
        assert_eq!(info.extra["dbname"], "prod_darmok");
    }

    #[test]
    fn test_replies_use_ruby_truthiness() {
        let info: DumpInfo =
            serde_json::from_value(json!({"success": null, "message": "no key"})).unwrap();
        assert!(!info.success);
        assert_eq!(info.reason(), "no key");

        let info: DumpInfo =
            serde_json::from_value(json!({"success": "yes", "size": "2048"})).unwrap();
        assert!(info.success);
        assert_eq!(info.size, Some(2048));

        let info: DumpInfo = serde_json::from_value(json!({"success": 1, "size": null})).unwrap();
        assert!(info.success);
        assert_eq!(info.size, None);

        let reply: ApiResponse =
            serde_json::from_value(json!({"success": null, "message": "dump in progress"})).unwrap();
        assert!(!reply.success);
        assert_eq!(reply.reason(), "dump in progress");
    }
}
