use std::fmt;
use std::path::PathBuf;

/// ライブラリ境界で返すエラー
#[derive(Debug)]
pub enum Seq2SeqError {
    /// 設定値の不整合
    InvalidConfig(String),
    /// バッチ形状の不整合（ソース/ターゲットのバッチサイズ、シーケンス長）
    BatchShape(String),
    /// 保存済みモデルと現在の語彙のサイズ不一致
    VocabularyMismatch {
        side: &'static str,
        saved: usize,
        current: usize,
    },
    /// チェックポイントが存在しない
    MissingCheckpoint(PathBuf),
    /// Burnのレコーダーのエラー
    Recorder(String),
    Io(std::io::Error),
}

impl fmt::Display for Seq2SeqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Seq2SeqError::InvalidConfig(msg) => write!(f, "設定エラー: {}", msg),
            Seq2SeqError::BatchShape(msg) => write!(f, "バッチ形状エラー: {}", msg),
            Seq2SeqError::VocabularyMismatch {
                side,
                saved,
                current,
            } => write!(
                f,
                "{}語彙サイズが一致しません（保存済み: {}, 現在: {}）",
                side, saved, current
            ),
            Seq2SeqError::MissingCheckpoint(path) => {
                write!(f, "チェックポイントが見つかりません: {}", path.display())
            }
            Seq2SeqError::Recorder(msg) => write!(f, "レコーダーエラー: {}", msg),
            Seq2SeqError::Io(e) => write!(f, "I/Oエラー: {}", e),
        }
    }
}

impl std::error::Error for Seq2SeqError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Seq2SeqError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Seq2SeqError {
    fn from(e: std::io::Error) -> Self {
        Seq2SeqError::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Seq2SeqError>;
