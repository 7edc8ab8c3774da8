//! Structural schema every committed [`AppState`](crate::model::AppState) must satisfy.

use refract_core::Schema;

/// The schema checked by the validate interceptor
///
/// Every task has a uuid `id` equal to its key, a string `title` and a
/// boolean `done`; `showing` is one of the three filter names.
#[must_use]
pub fn app_state() -> Schema {
    let task = Schema::object()
        .field("id", Schema::uuid())
        .field("title", Schema::string())
        .field("done", Schema::bool());

    Schema::object()
        .field("todos", Schema::map_of(Schema::uuid(), task).with_key_field("id"))
        .field("showing", Schema::one_of(["all", "active", "done"]))
}
