//! sqlx エラーから StoreError への変換

use tally_core::domain::StoreError;

pub(crate) fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}
