// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Stdout access log configuration for the admin interface and proxy filters.

use super::types::{AccessLog, DataSource, StdoutAccessLog, SubstitutionFormatString, TypedConfig};
use std::collections::BTreeMap;

/// Text line logged for every proxied connection
pub const CLUSTER_TEXT_LOG_FORMAT: &str = "[%START_TIME%] %BYTES_RECEIVED% %BYTES_SENT% %DURATION% \"%DOWNSTREAM_REMOTE_ADDRESS%\" \"%UPSTREAM_HOST%\" \"%UPSTREAM_CLUSTER%\"";

/// Text line logged for every admin interface request
pub const ADMIN_TEXT_LOG_FORMAT: &str = "[%START_TIME%] \"%REQ(:METHOD)% %REQ(X-ENVOY-ORIGINAL-PATH?:PATH)% %PROTOCOL%\" %RESPONSE_CODE% %RESPONSE_FLAGS% %BYTES_RECEIVED% %BYTES_SENT% %DURATION% %RESP(X-ENVOY-UPSTREAM-SERVICE-TIME)% \"%REQ(X-FORWARDED-FOR)%\" \"%REQ(USER-AGENT)%\" \"%REQ(X-REQUEST-ID)%\" \"%REQ(:AUTHORITY)%\" \"%UPSTREAM_HOST%\"\n";

const STDOUT_ACCESS_LOG_NAME: &str = "envoy.stdout_access_log";
const STDOUT_ACCESS_LOG_TYPE: &str =
    "type.googleapis.com/envoy.extensions.access_loggers.stream.v3.StdoutAccessLog";
const CONTENT_TYPE_JSON: &str = "application/json; charset=UTF-8";

/// Fields emitted by the structured log format.
const JSON_LOG_FIELDS: &[(&str, &str)] = &[
    ("authority", "%REQ(:AUTHORITY)%"),
    ("bytes_received", "%BYTES_RECEIVED%"),
    ("bytes_sent", "%BYTES_SENT%"),
    (
        "connection_termination_details",
        "%CONNECTION_TERMINATION_DETAILS%",
    ),
    ("downstream_local_address", "%DOWNSTREAM_LOCAL_ADDRESS%"),
    ("downstream_remote_address", "%DOWNSTREAM_REMOTE_ADDRESS%"),
    ("duration", "%DURATION%"),
    ("method", "%REQ(:METHOD)%"),
    ("path", "%REQ(X-ENVOY-ORIGINAL-PATH?:PATH)%"),
    ("protocol", "%PROTOCOL%"),
    ("requested_server_name", "%REQUESTED_SERVER_NAME%"),
    ("response_code", "%RESPONSE_CODE%"),
    ("response_code_details", "%RESPONSE_CODE_DETAILS%"),
    ("response_flags", "%RESPONSE_FLAGS%"),
    ("start_time", "%START_TIME%"),
    ("upstream_cluster", "%UPSTREAM_CLUSTER%"),
    ("upstream_host", "%UPSTREAM_HOST%"),
    ("upstream_local_address", "%UPSTREAM_LOCAL_ADDRESS%"),
    ("upstream_service_time", "%RESP(X-ENVOY-UPSTREAM-SERVICE-TIME)%"),
    (
        "upstream_transport_failure_reason",
        "%UPSTREAM_TRANSPORT_FAILURE_REASON%",
    ),
    ("user_agent", "%REQ(USER-AGENT)%"),
];

/// Which log line an access log carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogKind {
    /// Admin interface requests
    Admin,
    /// Connections proxied by a listener filter
    Cluster,
}

/// Build the stdout access log list for `kind`, structured when `json` is set.
#[must_use]
pub fn stdout_access_log(kind: LogKind, json: bool) -> Vec<AccessLog> {
    let log_format = if json {
        SubstitutionFormatString {
            text_format_source: None,
            json_format: Some(JSON_LOG_FIELDS.iter().copied().collect::<BTreeMap<_, _>>()),
            omit_empty_values: true,
            content_type: CONTENT_TYPE_JSON,
        }
    } else {
        let line = match kind {
            LogKind::Admin => ADMIN_TEXT_LOG_FORMAT,
            LogKind::Cluster => CLUSTER_TEXT_LOG_FORMAT,
        };
        SubstitutionFormatString {
            text_format_source: Some(DataSource {
                inline_string: line.to_string(),
            }),
            json_format: None,
            omit_empty_values: true,
            content_type: CONTENT_TYPE_JSON,
        }
    };

    vec![AccessLog {
        name: STDOUT_ACCESS_LOG_NAME,
        typed_config: TypedConfig {
            type_url: STDOUT_ACCESS_LOG_TYPE,
            config: StdoutAccessLog { log_format },
        },
    }]
}

#[cfg(test)]
#[path = "access_log_tests.rs"]
mod access_log_tests;
