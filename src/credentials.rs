//! Service-account credentials and the strategies used to locate them.

use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::file_utils::validate_file_exists;

pub const CREDENTIALS_ENV: &str = "PROGAIN_CREDENTIALS";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("cannot read credentials {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("credentials {path} are not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("credentials {path} have type '{found}', expected 'service_account'")]
    WrongType { path: PathBuf, found: String },
    #[error("credentials {0} have no project_id")]
    MissingProjectId(PathBuf),
    #[error("environment variable {0} is not set")]
    MissingEnv(String),
    #[error("no credentials file was selected")]
    NothingSelected,
}

/// The fields of a service-account key file this tool relies on
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceAccount {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub client_email: Option<String>,
}

impl ServiceAccount {
    pub fn load(path: &Path) -> Result<Self, CredentialError> {
        validate_file_exists(path).map_err(|source| CredentialError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let raw = fs::read_to_string(path).map_err(|source| CredentialError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let account: ServiceAccount =
            serde_json::from_str(&raw).map_err(|source| CredentialError::Json {
                path: path.to_path_buf(),
                source,
            })?;

        if let Some(kind) = &account.kind {
            if kind != "service_account" {
                return Err(CredentialError::WrongType {
                    path: path.to_path_buf(),
                    found: kind.clone(),
                });
            }
        }
        if account.project_id.trim().is_empty() {
            return Err(CredentialError::MissingProjectId(path.to_path_buf()));
        }
        Ok(account)
    }
}

/// How the credentials file is located at startup
#[derive(Debug, Clone, PartialEq)]
pub enum CredentialSource {
    Fixed(PathBuf),
    Env(String),
    Prompt,
}

impl CredentialSource {
    pub fn resolve(&self) -> Result<PathBuf, CredentialError> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        self.resolve_with(&mut stdin.lock(), &mut stdout)
    }

    pub fn resolve_with<R: BufRead, W: Write>(
        &self,
        input: &mut R,
        output: &mut W,
    ) -> Result<PathBuf, CredentialError> {
        let path = match self {
            CredentialSource::Fixed(path) => path.clone(),
            CredentialSource::Env(var) => match env::var_os(var) {
                Some(value) if !value.is_empty() => PathBuf::from(value),
                _ => return Err(CredentialError::MissingEnv(var.clone())),
            },
            CredentialSource::Prompt => prompt_for_path(input, output)?,
        };
        info!("✓ Credenciales: {}", path.display());
        Ok(path)
    }

    /// Resolves and loads in one step
    pub fn load(&self) -> Result<ServiceAccount, CredentialError> {
        ServiceAccount::load(&self.resolve()?)
    }
}

fn prompt_for_path<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
) -> Result<PathBuf, CredentialError> {
    let stdout_err = |source| CredentialError::Io {
        path: PathBuf::from("<stdout>"),
        source,
    };
    write!(output, "Ruta del archivo de credenciales (.json): ").map_err(stdout_err)?;
    output.flush().map_err(stdout_err)?;

    let mut line = String::new();
    input.read_line(&mut line).map_err(|source| CredentialError::Io {
        path: PathBuf::from("<stdin>"),
        source,
    })?;
    let trimmed = line.trim().trim_matches('"');
    if trimmed.is_empty() {
        return Err(CredentialError::NothingSelected);
    }
    Ok(PathBuf::from(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_key(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("firebase_credentials.json");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_service_account() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_key(
            dir.path(),
            r#"{"type":"service_account","project_id":"equipos-zoec","client_email":"a@b.c","private_key":"x"}"#,
        );
        let account = ServiceAccount::load(&path).unwrap();
        assert_eq!(account.project_id, "equipos-zoec");
        assert_eq!(account.client_email.as_deref(), Some("a@b.c"));
    }

    #[test]
    fn rejects_other_credential_types_and_missing_project() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_key(dir.path(), r#"{"type":"authorized_user","project_id":"p"}"#);
        assert!(matches!(
            ServiceAccount::load(&path),
            Err(CredentialError::WrongType { .. })
        ));

        let path = write_key(dir.path(), r#"{"type":"service_account"}"#);
        assert!(matches!(
            ServiceAccount::load(&path),
            Err(CredentialError::MissingProjectId(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ServiceAccount::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, CredentialError::Io { .. }));
    }

    #[test]
    fn prompt_reads_a_path_from_input() {
        let mut input = io::Cursor::new(b"\"/tmp/key.json\"\n".to_vec());
        let mut output = Vec::new();
        let path = CredentialSource::Prompt
            .resolve_with(&mut input, &mut output)
            .unwrap();
        assert_eq!(path, PathBuf::from("/tmp/key.json"));
        assert!(String::from_utf8(output).unwrap().contains("credenciales"));
    }

    #[test]
    fn empty_prompt_means_nothing_selected() {
        let mut input = io::Cursor::new(b"\n".to_vec());
        let mut output = Vec::new();
        let err = CredentialSource::Prompt
            .resolve_with(&mut input, &mut output)
            .unwrap_err();
        assert!(matches!(err, CredentialError::NothingSelected));
    }

    #[test]
    fn unset_env_variable_is_reported() {
        let source = CredentialSource::Env("PROGAIN_TOOLS_TEST_UNSET_VARIABLE".into());
        let mut input = io::Cursor::new(Vec::new());
        let err = source.resolve_with(&mut input, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, CredentialError::MissingEnv(_)));
    }

    #[test]
    fn fixed_path_is_returned_as_is() {
        let source = CredentialSource::Fixed(PathBuf::from("firebase_credentials.json"));
        let mut input = io::Cursor::new(Vec::new());
        let path = source.resolve_with(&mut input, &mut Vec::new()).unwrap();
        assert_eq!(path, PathBuf::from("firebase_credentials.json"));
    }
}
