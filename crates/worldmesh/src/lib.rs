// worldmesh - WoW map tile decoder
// Parses the chunked ADT tile container, rebuilds the terrain heightfield
// with water-covered cells carved out, and resolves the doodad model
// placements each tile references.

pub mod adt;
pub mod chunk;
pub mod error;
pub mod m2;
pub mod math;
pub mod mesh;
pub mod session;
pub mod source;
pub mod wdt;
pub mod world;

pub use adt::{Adt, MeshDetail, TileOptions};
pub use error::{DecodeError, Result};
pub use mesh::Mesh;
pub use session::Session;
pub use source::{ArchiveSource, MpqArchive};
pub use wdt::Wdt;
pub use world::World;
