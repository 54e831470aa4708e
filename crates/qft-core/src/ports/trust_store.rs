//! TrustStore - 証明書・秘密鍵の置き場所
//!
//! 中身の生成・検証はエンジンの仕事。ここでは「決まった場所にあるか」だけを見る。
//!
//! ```text
//! <data_dir>/cert/cert.der
//! <data_dir>/cert/key.der
//! ```

use std::io;
use std::path::{Path, PathBuf};

const CERT_DIR: &str = "cert";
const CERT_FILE: &str = "cert.der";
const KEY_FILE: &str = "key.der";

/// 証明書と秘密鍵のパス
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustMaterialPaths {
    pub certificate: PathBuf,
    pub private_key: PathBuf,
}

/// TrustStore は data_dir 配下の固定パスを管理
#[derive(Debug, Clone)]
pub struct TrustStore {
    dir: PathBuf,
    paths: TrustMaterialPaths,
}

impl TrustStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let dir = data_dir.as_ref().join(CERT_DIR);
        let paths = TrustMaterialPaths {
            certificate: dir.join(CERT_FILE),
            private_key: dir.join(KEY_FILE),
        };
        Self { dir, paths }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn paths(&self) -> &TrustMaterialPaths {
        &self.paths
    }

    pub async fn has_certificate(&self) -> io::Result<bool> {
        is_file(&self.paths.certificate).await
    }

    pub async fn has_private_key(&self) -> io::Result<bool> {
        is_file(&self.paths.private_key).await
    }

    /// 書き出し先のディレクトリを作る
    pub async fn prepare(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }
}

async fn is_file(path: &Path) -> io::Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_file()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
