//! Transmission JSON-RPC wire types.
//!
//! Transmission uses kebab-case argument names for most methods and
//! camelCase field names inside `torrent-get` results.

use serde::{Deserialize, Serialize};

use relay_types::error::SwarmError;
use relay_types::fetch::{SwarmFile, SwarmStats, SwarmStatus};

/// Fields requested from `torrent-get` for status polling.
pub const STATS_FIELDS: &[&str] = &[
    "id",
    "hashString",
    "status",
    "error",
    "errorString",
    "metadataPercentComplete",
    "sizeWhenDone",
    "leftUntilDone",
    "peersConnected",
];

/// Fields requested from `torrent-get` for the file layout.
pub const FILE_FIELDS: &[&str] = &["id", "hashString", "files"];

/// Transmission's `error` value for a local error (disk full, missing data).
const LOCAL_ERROR: i64 = 3;

#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest<A> {
    pub method: &'static str,
    pub arguments: A,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse<T> {
    pub result: String,
    pub arguments: Option<T>,
}

impl<T> RpcResponse<T> {
    /// `result` is the literal `"success"` on success and an error message
    /// otherwise.
    pub fn into_arguments(self) -> Result<T, SwarmError> {
        if self.result != "success" {
            return Err(SwarmError::Rpc(self.result));
        }
        self.arguments
            .ok_or_else(|| SwarmError::Deserialization("response has no arguments".into()))
    }

    /// Check `result` only, for methods whose arguments carry nothing.
    pub fn check(self) -> Result<(), SwarmError> {
        match self.result.as_str() {
            "success" => Ok(()),
            _ => Err(SwarmError::Rpc(self.result)),
        }
    }
}

/// `torrent-add` arguments.
#[derive(Debug, Clone, Serialize)]
pub struct TorrentAddArgs<'a> {
    pub filename: &'a str,
    #[serde(rename = "download-dir")]
    pub download_dir: &'a str,
    pub paused: bool,
}

/// `torrent-add` result: exactly one of the two keys is present.
#[derive(Debug, Clone, Deserialize)]
pub struct TorrentAddResult {
    #[serde(rename = "torrent-added", default)]
    pub added: Option<AddedTorrent>,
    #[serde(rename = "torrent-duplicate", default)]
    pub duplicate: Option<AddedTorrent>,
}

/// What `torrent-add` did with the locator.
#[derive(Debug, Clone)]
pub enum AddOutcome {
    Added(AddedTorrent),
    /// The daemon already had the torrent and left it untouched.
    Duplicate(AddedTorrent),
}

impl TorrentAddResult {
    pub fn into_outcome(self) -> Result<AddOutcome, SwarmError> {
        match (self.added, self.duplicate) {
            (Some(torrent), _) => Ok(AddOutcome::Added(torrent)),
            (None, Some(torrent)) => Ok(AddOutcome::Duplicate(torrent)),
            (None, None) => Err(SwarmError::Deserialization(
                "torrent-add returned no torrent".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddedTorrent {
    pub id: i64,
    pub hash_string: String,
    #[serde(default)]
    pub name: String,
}

/// `torrent-get` arguments.
#[derive(Debug, Clone, Serialize)]
pub struct TorrentGetArgs<'a> {
    pub ids: [&'a str; 1],
    pub fields: &'static [&'static str],
}

#[derive(Debug, Clone, Deserialize)]
pub struct TorrentGetResult {
    #[serde(default)]
    pub torrents: Vec<TorrentInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TorrentInfo {
    #[serde(default)]
    pub hash_string: String,
    #[serde(default)]
    pub status: i64,
    #[serde(default)]
    pub error: i64,
    #[serde(default)]
    pub error_string: String,
    #[serde(default)]
    pub metadata_percent_complete: f64,
    #[serde(default)]
    pub size_when_done: u64,
    #[serde(default)]
    pub left_until_done: u64,
    #[serde(default)]
    pub peers_connected: u32,
    #[serde(default)]
    pub files: Vec<TorrentFile>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TorrentFile {
    pub name: String,
    pub length: u64,
    #[serde(default)]
    pub bytes_completed: u64,
}

impl TorrentInfo {
    pub fn to_stats(&self) -> Result<SwarmStats, SwarmError> {
        if self.error == LOCAL_ERROR {
            return Err(SwarmError::Resource(self.error_string.clone()));
        }

        let status = if self.metadata_percent_complete < 1.0 {
            SwarmStatus::Resolving
        } else {
            match self.status {
                0 => SwarmStatus::Stopped,
                1..=4 => SwarmStatus::Downloading,
                5 | 6 => SwarmStatus::Seeding,
                other => {
                    return Err(SwarmError::Rpc(format!("unknown torrent status {other}")));
                }
            }
        };

        Ok(SwarmStats {
            status,
            bytes_completed: self.size_when_done.saturating_sub(self.left_until_done),
            bytes_total: self.size_when_done,
            peer_count: self.peers_connected,
        })
    }

    pub fn to_files(&self) -> Vec<SwarmFile> {
        self.files
            .iter()
            .map(|f| SwarmFile {
                relative_path: f.name.clone(),
                length: f.length,
            })
            .collect()
    }
}

/// `torrent-set` arguments for file selection. Transmission rejects empty
/// index lists, so they are omitted.
#[derive(Debug, Clone, Serialize)]
pub struct TorrentSetFilesArgs<'a> {
    pub ids: [&'a str; 1],
    #[serde(rename = "files-wanted", skip_serializing_if = "Vec::is_empty")]
    pub files_wanted: Vec<usize>,
    #[serde(rename = "files-unwanted", skip_serializing_if = "Vec::is_empty")]
    pub files_unwanted: Vec<usize>,
}

/// Arguments for methods that take only torrent ids (`torrent-start`,
/// `torrent-stop`).
#[derive(Debug, Clone, Serialize)]
pub struct IdsArgs<'a> {
    pub ids: Vec<&'a str>,
}

/// `torrent-remove` arguments. Downloaded data is always kept.
#[derive(Debug, Clone, Serialize)]
pub struct TorrentRemoveArgs<'a> {
    pub ids: Vec<&'a str>,
    #[serde(rename = "delete-local-data")]
    pub delete_local_data: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(json: &str) -> TorrentInfo {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_torrent_get_response() {
        let resp: RpcResponse<TorrentGetResult> = serde_json::from_str(
            r#"{
                "arguments": {
                    "torrents": [{
                        "id": 4,
                        "hashString": "c12fe1c06bba254a9dc9f519b335aa7c1367a88a",
                        "status": 4,
                        "error": 0,
                        "errorString": "",
                        "metadataPercentComplete": 1,
                        "sizeWhenDone": 1000,
                        "leftUntilDone": 250,
                        "peersConnected": 12,
                        "files": [
                            {"name": "Show/ep1.mkv", "length": 700, "bytesCompleted": 700},
                            {"name": "Show/notes.txt", "length": 300, "bytesCompleted": 50}
                        ]
                    }]
                },
                "result": "success"
            }"#,
        )
        .unwrap();

        let torrents = resp.into_arguments().unwrap().torrents;
        assert_eq!(torrents.len(), 1);
        let stats = torrents[0].to_stats().unwrap();
        assert_eq!(stats.status, SwarmStatus::Downloading);
        assert_eq!(stats.bytes_completed, 750);
        assert_eq!(stats.bytes_total, 1000);
        assert_eq!(stats.peer_count, 12);

        let files = torrents[0].to_files();
        assert_eq!(files[1].relative_path, "Show/notes.txt");
        assert_eq!(files[1].length, 300);
    }

    #[test]
    fn test_rpc_failure_result() {
        let resp: RpcResponse<TorrentGetResult> =
            serde_json::from_str(r#"{"arguments": {}, "result": "invalid or corrupt torrent file"}"#)
                .unwrap();
        match resp.into_arguments() {
            Err(SwarmError::Rpc(message)) => assert_eq!(message, "invalid or corrupt torrent file"),
            other => panic!("expected rpc error, got {other:?}"),
        }
    }

    #[test]
    fn test_status_mapping() {
        let resolving = info(r#"{"status": 4, "metadataPercentComplete": 0.4}"#);
        assert_eq!(resolving.to_stats().unwrap().status, SwarmStatus::Resolving);

        for (code, expected) in [
            (0, SwarmStatus::Stopped),
            (1, SwarmStatus::Downloading),
            (2, SwarmStatus::Downloading),
            (3, SwarmStatus::Downloading),
            (4, SwarmStatus::Downloading),
            (5, SwarmStatus::Seeding),
            (6, SwarmStatus::Seeding),
        ] {
            let t = info(&format!(r#"{{"status": {code}, "metadataPercentComplete": 1}}"#));
            assert_eq!(t.to_stats().unwrap().status, expected, "status {code}");
        }

        let bogus = info(r#"{"status": 9, "metadataPercentComplete": 1}"#);
        assert!(matches!(bogus.to_stats(), Err(SwarmError::Rpc(_))));
    }

    #[test]
    fn test_local_error_is_surfaced() {
        let t = info(
            r#"{"status": 0, "error": 3, "errorString": "No data found!", "metadataPercentComplete": 1}"#,
        );
        match t.to_stats() {
            Err(SwarmError::Resource(message)) => assert_eq!(message, "No data found!"),
            other => panic!("expected resource error, got {other:?}"),
        }

        // Tracker warnings (error 1) do not fail the transfer.
        let warned = info(r#"{"status": 4, "error": 1, "metadataPercentComplete": 1}"#);
        assert!(warned.to_stats().is_ok());
    }

    #[test]
    fn test_add_result_tells_duplicate_apart() {
        let added: TorrentAddResult = serde_json::from_str(
            r#"{"torrent-added": {"id": 1, "hashString": "aa", "name": "a"}}"#,
        )
        .unwrap();
        match added.into_outcome().unwrap() {
            AddOutcome::Added(torrent) => assert_eq!(torrent.hash_string, "aa"),
            other => panic!("expected added, got {other:?}"),
        }

        let duplicate: TorrentAddResult = serde_json::from_str(
            r#"{"torrent-duplicate": {"id": 2, "hashString": "bb", "name": "b"}}"#,
        )
        .unwrap();
        match duplicate.into_outcome().unwrap() {
            AddOutcome::Duplicate(torrent) => assert_eq!(torrent.id, 2),
            other => panic!("expected duplicate, got {other:?}"),
        }

        let neither: TorrentAddResult = serde_json::from_str("{}").unwrap();
        assert!(neither.into_outcome().is_err());
    }

    #[test]
    fn test_set_files_omits_empty_lists() {
        let args = TorrentSetFilesArgs {
            ids: ["aa"],
            files_wanted: vec![0, 2],
            files_unwanted: vec![],
        };
        let json = serde_json::to_value(&args).unwrap();
        assert_eq!(json["files-wanted"], serde_json::json!([0, 2]));
        assert!(json.get("files-unwanted").is_none());
        assert_eq!(json["ids"], serde_json::json!(["aa"]));
    }

    #[test]
    fn test_add_args_use_kebab_case() {
        let request = RpcRequest {
            method: "torrent-add",
            arguments: TorrentAddArgs {
                filename: "magnet:?xt=urn:btih:abc",
                download_dir: "/srv/dl",
                paused: false,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["method"], "torrent-add");
        assert_eq!(json["arguments"]["download-dir"], "/srv/dl");
        assert_eq!(json["arguments"]["paused"], false);
    }
}
