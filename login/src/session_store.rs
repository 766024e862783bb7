use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use std::fs::File;
use std::fs::OpenOptions;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::path::PathBuf;

use crate::token_provider::UserProfile;

/// The persisted session: the access token, its absolute expiry, and the
/// last-fetched profile. The three entries are always written together and
/// removed together; partial updates never hit disk.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct SessionDotJson {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_expiry: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<UserProfile>,
}

pub fn get_session_file(quadrant_home: &Path) -> PathBuf {
    quadrant_home.join("session.json")
}

/// Delete the session.json file inside `quadrant_home` if it exists. Returns
/// `Ok(true)` if a file was removed, `Ok(false)` if none was present.
pub fn remove_session_json(quadrant_home: &Path) -> std::io::Result<bool> {
    let session_file = get_session_file(quadrant_home);
    match std::fs::remove_file(&session_file) {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Attempt to read and deserialize the `session.json` file at the given path.
pub fn try_read_session_json(session_file: &Path) -> std::io::Result<SessionDotJson> {
    let mut file = File::open(session_file)?;
    let mut contents = String::new();
    use std::io::Read as _;
    file.read_to_string(&mut contents)?;
    let session_dot_json: SessionDotJson = serde_json::from_str(&contents)?;
    Ok(session_dot_json)
}

pub fn write_session_json(
    session_file: &Path,
    session_dot_json: &SessionDotJson,
) -> std::io::Result<()> {
    let json_data = serde_json::to_string_pretty(session_dot_json)?;
    let mut options = OpenOptions::new();
    options.truncate(true).write(true).create(true);
    #[cfg(unix)]
    {
        options.mode(0o600);
    }
    let mut file = options.open(session_file)?;
    use std::io::Write as _;
    file.write_all(json_data.as_bytes())?;
    file.flush()?;
    Ok(())
}
