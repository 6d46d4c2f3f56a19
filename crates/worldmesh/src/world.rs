// Map access - resolves tile paths through the map index

use tracing::info;

use crate::adt::{Adt, TileOptions};
use crate::error::{DecodeError, Result};
use crate::session::Session;
use crate::source::ArchiveSource;
use crate::wdt::Wdt;

/// One named map and its tile index.
#[derive(Debug)]
pub struct World {
    name: String,
    wdt: Wdt,
}

impl World {
    /// Load the map index for `name`, e.g. "Azeroth".
    pub fn open(source: &mut dyn ArchiveSource, name: &str) -> Result<World> {
        let path = format!("World\\Maps\\{name}\\{name}.wdt");
        let Some(data) = source.load_file(&path) else {
            return Err(DecodeError::NotFound(path));
        };
        let wdt = Wdt::decode(&data)?;
        Ok(World {
            name: name.to_string(),
            wdt,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn wdt(&self) -> &Wdt {
        &self.wdt
    }

    pub fn tile_path(&self, x: usize, y: usize) -> String {
        format!("World\\Maps\\{}\\{}_{}_{}.adt", self.name, self.name, x, y)
    }

    /// Decode the tile at grid position (x, y). `None` when the index
    /// does not list it, or lists it but the file is gone from the
    /// archives.
    pub fn load_tile(
        &self,
        source: &mut dyn ArchiveSource,
        session: &Session,
        x: usize,
        y: usize,
        options: &TileOptions,
    ) -> Result<Option<Adt>> {
        if !self.wdt.has_adt(x, y) {
            return Ok(None);
        }
        let path = self.tile_path(x, y);
        let Some(data) = source.load_file(&path) else {
            info!("Tile {} is listed but not present, skipping", path);
            return Ok(None);
        };
        let adt = Adt::decode(&data, source, session, options)?;
        Ok(Some(adt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adt::testdata::{tile_bytes, TileSpec};
    use crate::source::testutil::MemSource;
    use crate::wdt::testdata::wdt_bytes;

    fn test_source() -> MemSource {
        let mut source = MemSource::new();
        source.insert("World\\Maps\\Test\\Test.wdt", wdt_bytes(&[(1, 2), (5, 5)]));
        source.insert(
            "World\\Maps\\Test\\Test_1_2.adt",
            tile_bytes(&TileSpec::default()),
        );
        source
    }

    #[test]
    fn test_open_missing_map() {
        let mut source = MemSource::new();
        let err = World::open(&mut source, "Nowhere").unwrap_err();
        assert!(matches!(err, DecodeError::NotFound(_)));
    }

    #[test]
    fn test_tile_path_layout() {
        let mut source = test_source();
        let world = World::open(&mut source, "Test").unwrap();
        assert_eq!(world.tile_path(1, 2), "World\\Maps\\Test\\Test_1_2.adt");
    }

    #[test]
    fn test_load_listed_tile() {
        let mut source = test_source();
        let world = World::open(&mut source, "Test").unwrap();
        let session = Session::new();
        let adt = world
            .load_tile(&mut source, &session, 1, 2, &TileOptions::default())
            .unwrap();
        assert!(adt.is_some());
    }

    #[test]
    fn test_unlisted_tile_is_none() {
        let mut source = test_source();
        let world = World::open(&mut source, "Test").unwrap();
        let session = Session::new();
        let adt = world
            .load_tile(&mut source, &session, 0, 0, &TileOptions::default())
            .unwrap();
        assert!(adt.is_none());
    }

    #[test]
    fn test_listed_but_absent_tile_is_none() {
        let mut source = test_source();
        let world = World::open(&mut source, "Test").unwrap();
        let session = Session::new();
        let adt = world
            .load_tile(&mut source, &session, 5, 5, &TileOptions::default())
            .unwrap();
        assert!(adt.is_none());
    }
}
