// handlers/users/mod.rs - User CRUD handlers
//
// Each handler translates between HTTP and the UserStore. Validation and
// status mapping live here; the store only reports NotFound/Internal.

pub mod body;     // Shared request body decoding + validation
pub mod create;   // POST /api/users
pub mod list;     // GET /api/users
pub mod show;     // GET /api/users/:id
pub mod update;   // PUT /api/users/:id
pub mod delete;   // DELETE /api/users/:id

pub use create::user_create;
pub use delete::user_delete;
pub use list::user_list;
pub use show::user_show;
pub use update::user_update;
