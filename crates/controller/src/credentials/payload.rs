//! Secret payload encodings of [`Credentials`].

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::ByteString;
use serde::Serialize;
use snafu::ResultExt;

use crate::{
    consts::{CREDENTIALS_PROCESS_CONTENT, k8s::secret},
    credentials::{Credentials, Error, error},
};

/// Document format read by the `credential_process` setting of AWS SDKs.
#[derive(Serialize)]
struct ProcessCredentials<'a> {
    #[serde(rename = "Version")]
    version: u8,
    #[serde(rename = "AccessKeyId")]
    access_key_id: &'a str,
    #[serde(rename = "SecretAccessKey")]
    secret_access_key: &'a str,
    #[serde(rename = "SessionToken")]
    session_token: &'a str,
    #[serde(rename = "Expiration")]
    expiration: String,
}

/// Formats `timestamp` the way it is stored under the `expire` key.
#[must_use]
pub fn format_expiration(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl Credentials {
    /// Renders the named files and fields stored in a credential secret.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SerializeProcessCredentials`] if the JSON document
    /// cannot be produced.
    pub fn to_secret_data(&self) -> Result<BTreeMap<String, ByteString>, Error> {
        let Self { role_arn, access_key_id, secret_access_key, session_token, expiration } = self;
        let expiration = format_expiration(expiration);

        let credentials_file = format!(
            "[default]\naws_access_key_id = {access_key_id}\naws_secret_access_key = \
             {secret_access_key}\naws_session_token = {session_token}\naws_expiration = \
             {expiration}\n"
        );

        let process_credentials = serde_json::to_vec(&ProcessCredentials {
            version: 1,
            access_key_id,
            secret_access_key,
            session_token,
            expiration: expiration.clone(),
        })
        .context(error::SerializeProcessCredentialsSnafu)?;

        Ok(BTreeMap::from([
            (secret::ROLE_ARN_KEY.to_string(), ByteString(role_arn.clone().into_bytes())),
            (secret::EXPIRE_KEY.to_string(), ByteString(expiration.into_bytes())),
            (secret::CREDENTIALS_FILE_KEY.to_string(), ByteString(credentials_file.into_bytes())),
            (
                secret::CREDENTIALS_PROCESS_FILE_KEY.to_string(),
                ByteString(CREDENTIALS_PROCESS_CONTENT.as_bytes().to_vec()),
            ),
            (secret::CREDENTIALS_JSON_FILE_KEY.to_string(), ByteString(process_credentials)),
        ]))
    }
}
