// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Node-local logger services.
//!
//! Loggers are not part of the peer API. Nodes that support them advertise
//! two services, `<node>/get_loggers` and `<node>/set_logger_level`, with
//! the fixed `roscpp/GetLoggers` and `roscpp/SetLoggerLevel` schemas.

use crate::error::{ChaosError, Result};
use crate::rpc::tcpros::{put_string, MessageReader};
use crate::rpc::ServiceRequest;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Logger verbosity accepted by `set_logger_level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggerLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LoggerLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }

    /// Parse level from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "WARN" | "WARNING" => Some(Self::Warn),
            "ERROR" => Some(Self::Error),
            "FATAL" => Some(Self::Fatal),
            _ => None,
        }
    }
}

impl fmt::Display for LoggerLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoggerLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| {
            format!(
                "unknown logger level '{}' (expected debug, info, warn, error or fatal)",
                s
            )
        })
    }
}

/// One logger inside a node, as reported by `get_loggers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoggerRecord {
    pub name: String,
    /// Level as the node reports it; not necessarily one of [`LoggerLevel`].
    pub level: String,
}

/// Logger services advertised by one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerService {
    pub node: String,
    pub get_loggers: String,
    pub set_logger_level: String,
}

impl LoggerService {
    pub const GET_LOGGERS_SUFFIX: &'static str = "/get_loggers";
    pub const SET_LOGGER_LEVEL_SUFFIX: &'static str = "/set_logger_level";

    pub fn for_node(node: &str) -> Self {
        Self {
            node: node.to_string(),
            get_loggers: format!("{}{}", node, Self::GET_LOGGERS_SUFFIX),
            set_logger_level: format!("{}{}", node, Self::SET_LOGGER_LEVEL_SUFFIX),
        }
    }
}

/// Fixed request/response pair of a node-local service.
pub trait ServiceSchema {
    const TYPE: &'static str;
    const MD5SUM: &'static str;

    type Response;

    fn encode(&self) -> Vec<u8>;

    fn decode_response(body: &[u8]) -> Result<Self::Response>;

    /// Build the request addressed to `service`.
    fn request(&self, caller_id: &str, service: &str) -> ServiceRequest {
        ServiceRequest {
            caller_id: caller_id.to_string(),
            service: service.to_string(),
            service_type: Self::TYPE,
            md5sum: Self::MD5SUM,
            body: self.encode(),
        }
    }
}

/// `roscpp/GetLoggers`: empty request, `Logger[] loggers` response.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetLoggers;

impl ServiceSchema for GetLoggers {
    const TYPE: &'static str = "roscpp/GetLoggers";
    const MD5SUM: &'static str = "32e97e85527d4678a8f9279894bb64b0";

    type Response = Vec<LoggerRecord>;

    fn encode(&self) -> Vec<u8> {
        Vec::new()
    }

    fn decode_response(body: &[u8]) -> Result<Self::Response> {
        let mut reader = MessageReader::new(body);
        let count = reader.read_u32()?;
        // Each entry is at least two empty strings.
        if count as usize > body.len() / 8 {
            return Err(ChaosError::Decode(format!(
                "{}: {} loggers in a {} byte response",
                Self::TYPE,
                count,
                body.len()
            )));
        }
        let mut loggers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = reader.read_string()?;
            let level = reader.read_string()?;
            loggers.push(LoggerRecord { name, level });
        }
        Ok(loggers)
    }
}

/// `roscpp/SetLoggerLevel`: `string logger, string level`, empty response.
#[derive(Debug, Clone)]
pub struct SetLoggerLevel {
    pub logger: String,
    pub level: LoggerLevel,
}

impl ServiceSchema for SetLoggerLevel {
    const TYPE: &'static str = "roscpp/SetLoggerLevel";
    const MD5SUM: &'static str = "51da076440d78ca1684d36c868df61ea";

    type Response = ();

    fn encode(&self) -> Vec<u8> {
        let mut body = Vec::with_capacity(self.logger.len() + 16);
        put_string(&mut body, &self.logger);
        put_string(&mut body, self.level.as_str());
        body
    }

    fn decode_response(_body: &[u8]) -> Result<Self::Response> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logger_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut body = (entries.len() as u32).to_le_bytes().to_vec();
        for (name, level) in entries {
            put_string(&mut body, name);
            put_string(&mut body, level);
        }
        body
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(LoggerLevel::parse("debug"), Some(LoggerLevel::Debug));
        assert_eq!(LoggerLevel::parse("WARNING"), Some(LoggerLevel::Warn));
        assert_eq!(LoggerLevel::parse("Fatal"), Some(LoggerLevel::Fatal));
        assert_eq!(LoggerLevel::parse("verbose"), None);
        assert!("loud".parse::<LoggerLevel>().is_err());
        assert_eq!("error".parse::<LoggerLevel>(), Ok(LoggerLevel::Error));
    }

    #[test]
    fn test_service_names() {
        let service = LoggerService::for_node("/camera");
        assert_eq!(service.get_loggers, "/camera/get_loggers");
        assert_eq!(service.set_logger_level, "/camera/set_logger_level");
    }

    #[test]
    fn test_get_loggers_decode() {
        let body = logger_bytes(&[("ros", "INFO"), ("ros.roscpp", "DEBUG")]);
        let loggers = GetLoggers::decode_response(&body).expect("decode");
        assert_eq!(
            loggers,
            vec![
                LoggerRecord {
                    name: "ros".into(),
                    level: "INFO".into()
                },
                LoggerRecord {
                    name: "ros.roscpp".into(),
                    level: "DEBUG".into()
                },
            ]
        );
        assert!(GetLoggers::decode_response(&logger_bytes(&[])).expect("empty").is_empty());
    }

    #[test]
    fn test_get_loggers_truncated() {
        let mut body = logger_bytes(&[("ros", "INFO")]);
        body.truncate(body.len() - 2);
        assert!(GetLoggers::decode_response(&body).is_err());

        let bogus = 1_000_000u32.to_le_bytes();
        assert!(GetLoggers::decode_response(&bogus).is_err());
    }

    #[test]
    fn test_set_logger_level_request() {
        let request = SetLoggerLevel {
            logger: "ros.roscpp".into(),
            level: LoggerLevel::Warn,
        }
        .request("/roschaos", "/camera/set_logger_level");

        assert_eq!(request.service_type, "roscpp/SetLoggerLevel");
        assert_eq!(request.md5sum, "51da076440d78ca1684d36c868df61ea");
        assert_eq!(request.service, "/camera/set_logger_level");

        let mut reader = MessageReader::new(&request.body);
        assert_eq!(reader.read_string().expect("logger"), "ros.roscpp");
        assert_eq!(reader.read_string().expect("level"), "warn");
        assert!(reader.is_empty());
    }
}
