//! altre-doc - 永続的なドキュメントモデル
//!
//! ロープ構造のテキスト、変更セット、範囲集合から成る編集基盤

// 設定
pub mod config;
pub mod error;

// データ層
pub mod text;

// 編集層
pub mod change;
pub mod rangeset;

// 公開API
pub use change::{Assoc, ChangeDesc, ChangeSet, ChangeSpec, FilteredChanges, Insertion, MapMode, Touch};
pub use config::{LineSeparator, TextConfig};
pub use error::{DocError, ErrorLevel, Result};
pub use rangeset::{
    Range, RangeComparator, RangeCursor, RangeSet, RangeSetBuilder, RangeSetUpdate, RangeValue, Side, SpanIterator,
};
pub use text::{Direction, Line, Text};
