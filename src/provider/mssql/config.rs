//! ADO-style connection-string parsing for the TDS provider.
//!
//! Accepts the usual `Key=Value;` attribute list with the aliases the ADO
//! providers understand (`Server`/`Data Source`, `Database`/`Initial
//! Catalog`, `UID`/`User ID`, `PWD`/`Password`). Unknown attributes such
//! as `Provider=` are tolerated and ignored.

use tiberius::{AuthMethod, Config as TiberiusConfig};

use crate::error::AdoDbError;

#[derive(Debug, Default)]
struct ParsedAttributes {
    server: Option<String>,
    database: Option<String>,
    user: Option<String>,
    password: Option<String>,
    instance: Option<String>,
    port: Option<u16>,
    trust_cert: bool,
}

pub(crate) fn parse_connection_string(
    connection_string: &str,
) -> Result<TiberiusConfig, AdoDbError> {
    let mut attributes = ParsedAttributes::default();

    for entry in connection_string.split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let Some((key, value)) = entry.split_once('=') else {
            return Err(AdoDbError::interface(format!(
                "malformed connection string entry {entry:?}"
            )));
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();
        match key.as_str() {
            "server" | "data source" | "address" | "addr" => {
                attributes.server = Some(value.to_string());
            }
            "database" | "initial catalog" => attributes.database = Some(value.to_string()),
            "uid" | "user id" | "user" => attributes.user = Some(value.to_string()),
            "pwd" | "password" => attributes.password = Some(value.to_string()),
            "instance" | "instance name" => attributes.instance = Some(value.to_string()),
            "port" => {
                attributes.port = Some(value.parse().map_err(|_| {
                    AdoDbError::interface(format!("invalid port {value:?} in connection string"))
                })?);
            }
            "trustservercertificate" | "trust server certificate" => {
                attributes.trust_cert =
                    matches!(value.to_ascii_lowercase().as_str(), "yes" | "true" | "1");
            }
            _ => {}
        }
    }

    build_tiberius_config(attributes)
}

fn build_tiberius_config(attributes: ParsedAttributes) -> Result<TiberiusConfig, AdoDbError> {
    let server = attributes.server.ok_or_else(|| {
        AdoDbError::interface("connection string is missing a Server/Data Source entry")
    })?;
    let user = attributes
        .user
        .ok_or_else(|| AdoDbError::interface("connection string is missing a UID/User ID entry"))?;

    // "tcp:host,port" and "host,port" forms carry an inline port.
    let server = server.strip_prefix("tcp:").unwrap_or(&server).to_string();
    let (host, inline_port) = match server.split_once(',') {
        Some((host, port_text)) => {
            let port = port_text.trim().parse().map_err(|_| {
                AdoDbError::interface(format!("invalid inline port in server {server:?}"))
            })?;
            (host.trim().to_string(), Some(port))
        }
        None => (server, None),
    };

    let mut config = TiberiusConfig::new();
    config.host(&host);
    config.port(inline_port.or(attributes.port).unwrap_or(1433));
    if let Some(database) = &attributes.database {
        config.database(database);
    }
    config.authentication(AuthMethod::sql_server(
        &user,
        attributes.password.as_deref().unwrap_or(""),
    ));
    if let Some(instance) = &attributes.instance {
        config.instance_name(instance);
    }
    if attributes.trust_cert {
        config.trust_cert();
    }
    Ok(config)
}
