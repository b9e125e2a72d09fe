//! エラーハンドリングシステム
//!
//! ドキュメントモデル全体で使用される統一されたエラー型を定義
//! 範囲外エラーは呼び出し側で回復可能、不変条件違反は呼び出し側のバグとして扱う

use thiserror::Error;

/// ドキュメントモデル全体のエラー型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocError {
    /// テキスト（ロープ）操作エラー
    #[error("Text operation failed: {0}")]
    Text(#[from] TextError),

    /// 変更セット操作エラー
    #[error("Change operation failed: {0}")]
    Change(#[from] ChangeError),

    /// 範囲集合操作エラー
    #[error("Range set operation failed: {0}")]
    RangeSet(#[from] RangeSetError),
}

/// テキスト操作固有のエラー
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TextError {
    #[error("Invalid position {pos} in document of length {length}")]
    PositionOutOfRange { pos: usize, length: usize },

    #[error("Invalid line number {line} in {lines}-line document")]
    LineOutOfRange { line: usize, lines: usize },

    #[error("Invalid range {from} to {to} in document of length {length}")]
    InvalidRange { from: usize, to: usize, length: usize },

    #[error("A document must have at least one line")]
    EmptyDocument,

    #[error("Invalid JSON representation of Text")]
    InvalidJson,
}

/// 変更セット固有のエラー
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChangeError {
    #[error("Invalid change range {from} to {to} (in doc of length {length})")]
    InvalidRange { from: usize, to: usize, length: usize },

    #[error("Applying change set to a document with the wrong length (expected {expected}, got {actual})")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Position {pos} is out of range for changeset of length {length}")]
    MapPosOutOfRange { pos: usize, length: usize },

    #[error("Mismatched change set lengths")]
    MismatchedLengths,

    #[error("Mismatched change set length (got {actual}, expected {expected})")]
    SpecLengthMismatch { expected: usize, actual: usize },

    #[error("Invalid JSON representation of {kind}")]
    InvalidJson { kind: &'static str },

    #[error(transparent)]
    Text(#[from] TextError),
}

/// 範囲集合固有のエラー
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RangeSetError {
    #[error("Ranges must be added sorted by `from` position and `startSide` (got {from} after {last_from})")]
    Unsorted { from: usize, last_from: usize },

    #[error("Range end {to} is before its start {from}")]
    InvalidRange { from: usize, to: usize },

    #[error(transparent)]
    Change(#[from] ChangeError),
}

/// エラーレベル分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLevel {
    /// 不正な位置・行・範囲の指定（呼び出し側で報告可能）
    OutOfRange,
    /// 呼び出し側のバグ（回復を想定しない）
    InvariantViolation,
}

impl TextError {
    pub fn level(&self) -> ErrorLevel {
        ErrorLevel::OutOfRange
    }
}

impl ChangeError {
    pub fn level(&self) -> ErrorLevel {
        match self {
            ChangeError::MismatchedLengths => ErrorLevel::InvariantViolation,
            ChangeError::Text(err) => err.level(),
            _ => ErrorLevel::OutOfRange,
        }
    }
}

impl RangeSetError {
    pub fn level(&self) -> ErrorLevel {
        match self {
            RangeSetError::Unsorted { .. } => ErrorLevel::InvariantViolation,
            RangeSetError::InvalidRange { .. } => ErrorLevel::OutOfRange,
            RangeSetError::Change(err) => err.level(),
        }
    }
}

impl DocError {
    /// エラーの分類を取得
    pub fn level(&self) -> ErrorLevel {
        match self {
            DocError::Text(err) => err.level(),
            DocError::Change(err) => err.level(),
            DocError::RangeSet(err) => err.level(),
        }
    }

    /// 呼び出し側のバグを示すエラーか判定
    pub fn is_invariant_violation(&self) -> bool {
        self.level() == ErrorLevel::InvariantViolation
    }
}

/// プロジェクト標準のResult型
pub type Result<T> = std::result::Result<T, DocError>;

/// 各モジュール固有のResult型
pub mod text {
    pub type Result<T> = std::result::Result<T, super::TextError>;
}

pub mod change {
    pub type Result<T> = std::result::Result<T, super::ChangeError>;
}

pub mod range_set {
    pub type Result<T> = std::result::Result<T, super::RangeSetError>;
}
