// Checkpoint: locate saved model parameters on disk
//
// A model directory holds one symbol file and one parameter file per saved
// epoch:
//
//   <dir>/<name>-symbol.json
//   <dir>/<name>-0001.params
//   <dir>/<name>-0002.params
//   ...
//
// `locate` picks the epoch to load: the `epoch` load option if given,
// otherwise the numerically largest four-digit suffix present. Only the
// directory itself is scanned, not subdirectories.
//
// Usage:
//   let ckpt = checkpoint::locate("models/mlp", "mlp", &HashMap::new())?;
//   let params = std::fs::read(ckpt.params_path())?;

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use regex::Regex;

use ndarena_core::{Error, Result};

/// Load option naming an explicit epoch, e.g. `"epoch" => "3"`.
pub const EPOCH_OPTION: &str = "epoch";

/// A resolved checkpoint: the path prefix shared by all files of the model
/// and the epoch to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// `<dir>/<name>`
    pub prefix: PathBuf,
    pub epoch: u32,
}

impl Checkpoint {
    /// `<prefix>-NNNN.params`
    pub fn params_path(&self) -> PathBuf {
        with_suffix(&self.prefix, &format!("-{:04}.params", self.epoch))
    }

    /// `<prefix>-symbol.json`
    pub fn symbol_path(&self) -> PathBuf {
        with_suffix(&self.prefix, "-symbol.json")
    }
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut s = OsString::from(prefix.as_os_str());
    s.push(suffix);
    PathBuf::from(s)
}

/// The absolute directory holding a model: `model_path` itself if it is a
/// directory, otherwise its parent. Relative paths resolve against the
/// current directory.
pub fn model_dir(model_path: &Path) -> Result<PathBuf> {
    let invalid = || Error::InvalidArgument(format!("invalid model path: '{}'", model_path.display()));
    if model_path.as_os_str().is_empty() {
        return Err(invalid());
    }
    let model_path = std::path::absolute(model_path)?;
    if model_path.is_dir() {
        return Ok(model_path);
    }
    model_path.parent().map(Path::to_path_buf).ok_or_else(invalid)
}

/// Epochs of `<model_name>-NNNN.params` files directly inside `dir`,
/// ascending.
pub fn list_epochs(dir: &Path, model_name: &str) -> Result<Vec<u32>> {
    let pattern = Regex::new(&format!(r"^{}-(\d{{4}})\.params$", regex::escape(model_name)))
        .map_err(|e| Error::msg(format!("bad checkpoint pattern: {e}")))?;

    let mut epochs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(epoch) = pattern
            .captures(name)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
        {
            epochs.push(epoch);
        }
    }
    epochs.sort_unstable();
    Ok(epochs)
}

/// Resolve the checkpoint of `model_name` under `model_path`.
///
/// Fails with `CheckpointNotFound` naming `<prefix>-0001.params` when no
/// epoch is given and no parameter file matches, and with an invalid-argument
/// error when the `epoch` option is not a non-negative integer.
pub fn locate(
    model_path: impl AsRef<Path>,
    model_name: &str,
    options: &HashMap<String, String>,
) -> Result<Checkpoint> {
    let dir = model_dir(model_path.as_ref())?;
    let prefix = dir.join(model_name);

    let epoch = match options.get(EPOCH_OPTION) {
        Some(raw) => raw.trim().parse::<u32>().map_err(|_| {
            Error::InvalidArgument(format!("{EPOCH_OPTION} option '{raw}' is not an epoch number"))
        })?,
        None => {
            let epochs = list_epochs(&dir, model_name)?;
            debug!("{}: found epochs {epochs:?}", prefix.display());
            match epochs.last() {
                Some(&latest) => latest,
                None => {
                    return Err(Error::CheckpointNotFound {
                        expected: with_suffix(&prefix, "-0001.params").display().to_string(),
                    })
                }
            }
        }
    };

    let checkpoint = Checkpoint { prefix, epoch };
    info!("resolved checkpoint {}", checkpoint.params_path().display());
    Ok(checkpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, names: &[&str]) {
        for name in names {
            fs::write(dir.join(name), b"").unwrap();
        }
    }

    fn epoch_option(value: &str) -> HashMap<String, String> {
        HashMap::from([(EPOCH_OPTION.to_string(), value.to_string())])
    }

    #[test]
    fn test_latest_epoch_is_numeric() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            &[
                "mlp-symbol.json",
                "mlp-0002.params",
                "mlp-0010.params",
                "mlp-0009.params",
            ],
        );
        let ckpt = locate(dir.path(), "mlp", &HashMap::new()).unwrap();
        assert_eq!(ckpt.epoch, 10);
        assert_eq!(ckpt.prefix, dir.path().join("mlp"));
        assert_eq!(ckpt.params_path(), dir.path().join("mlp-0010.params"));
        assert_eq!(ckpt.symbol_path(), dir.path().join("mlp-symbol.json"));
    }

    #[test]
    fn test_ignores_other_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(
            dir.path(),
            &[
                "mlp-0001.params",
                "mlp-00042.params",
                "mlp-abcd.params",
                "other-0099.params",
                "mlp-0050.params.bak",
            ],
        );
        assert_eq!(list_epochs(dir.path(), "mlp").unwrap(), vec![1]);
    }

    #[test]
    fn test_model_name_is_literal() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["resXnet-0003.params", "res.net-0001.params"]);
        assert_eq!(list_epochs(dir.path(), "res.net").unwrap(), vec![1]);
    }

    #[test]
    fn test_file_path_uses_parent_dir() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["mlp-symbol.json", "mlp-0004.params"]);
        let ckpt = locate(dir.path().join("mlp-symbol.json"), "mlp", &HashMap::new()).unwrap();
        assert_eq!(ckpt.epoch, 4);
        assert_eq!(ckpt.prefix, dir.path().join("mlp"));
    }

    #[test]
    fn test_explicit_epoch_overrides_discovery() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["mlp-0001.params", "mlp-0007.params"]);
        let ckpt = locate(dir.path(), "mlp", &epoch_option("3")).unwrap();
        assert_eq!(ckpt.epoch, 3);
        assert_eq!(ckpt.params_path(), dir.path().join("mlp-0003.params"));
    }

    #[test]
    fn test_explicit_epoch_skips_empty_dir_check() {
        let dir = tempfile::tempdir().unwrap();
        let ckpt = locate(dir.path(), "mlp", &epoch_option("12")).unwrap();
        assert_eq!(ckpt.epoch, 12);
    }

    #[test]
    fn test_malformed_epoch_option() {
        let dir = tempfile::tempdir().unwrap();
        for bad in ["three", "-1", ""] {
            let err = locate(dir.path(), "mlp", &epoch_option(bad)).unwrap_err();
            assert!(err.is_invalid_argument(), "{bad:?} gave {err}");
        }
    }

    #[test]
    fn test_relative_path_resolves_to_absolute_prefix() {
        let cwd = std::env::current_dir().unwrap();
        let ckpt = locate("mlp-symbol.json", "mlp", &epoch_option("1")).unwrap();
        assert_eq!(ckpt.prefix, cwd.join("mlp"));

        let ckpt = locate("no_such_models/mlp-symbol.json", "mlp", &epoch_option("2")).unwrap();
        assert!(ckpt.prefix.is_absolute());
        assert_eq!(ckpt.params_path(), cwd.join("no_such_models").join("mlp-0002.params"));

        assert!(locate("", "mlp", &epoch_option("1")).unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_not_found() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), &["mlp-symbol.json"]);
        match locate(dir.path(), "mlp", &HashMap::new()) {
            Err(Error::CheckpointNotFound { expected }) => {
                assert!(expected.ends_with("mlp-0001.params"), "{expected}");
                assert!(expected.starts_with(&dir.path().display().to_string()));
                assert!(Path::new(&expected).is_absolute());
            }
            other => panic!("expected CheckpointNotFound, got {other:?}"),
        }
    }
}
