// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `access_log.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use serde_json::json;

    #[test]
    fn test_text_admin_log() {
        let logs = stdout_access_log(LogKind::Admin, false);
        let value = serde_json::to_value(&logs).unwrap();

        assert_eq!(value[0]["name"], "envoy.stdout_access_log");
        assert_eq!(
            value[0]["typedConfig"]["@type"],
            "type.googleapis.com/envoy.extensions.access_loggers.stream.v3.StdoutAccessLog"
        );
        let format = &value[0]["typedConfig"]["logFormat"];
        assert_eq!(format["textFormatSource"]["inlineString"], ADMIN_TEXT_LOG_FORMAT);
        assert_eq!(format["omitEmptyValues"], true);
        assert_eq!(format["contentType"], "application/json; charset=UTF-8");
        assert!(format.get("jsonFormat").is_none());
    }

    #[test]
    fn test_text_cluster_log() {
        let value = serde_json::to_value(stdout_access_log(LogKind::Cluster, false)).unwrap();
        assert_eq!(
            value[0]["typedConfig"]["logFormat"]["textFormatSource"]["inlineString"],
            CLUSTER_TEXT_LOG_FORMAT
        );
    }

    #[test]
    fn test_json_log_ignores_kind() {
        let admin = stdout_access_log(LogKind::Admin, true);
        let cluster = stdout_access_log(LogKind::Cluster, true);
        assert_eq!(admin, cluster);

        let value = serde_json::to_value(&admin).unwrap();
        let format = &value[0]["typedConfig"]["logFormat"];
        assert!(format.get("textFormatSource").is_none());
        assert_eq!(format["jsonFormat"]["authority"], json!("%REQ(:AUTHORITY)%"));
        assert_eq!(format["jsonFormat"]["user_agent"], json!("%REQ(USER-AGENT)%"));
        assert_eq!(format["jsonFormat"].as_object().unwrap().len(), 21);
    }
}
