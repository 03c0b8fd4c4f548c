//! Map cache: regenerate rasters only when the shape changes.
//!
//! Map generation touches every pixel, while graph construction only
//! copies a handful of numbers. [`MapCache`] keeps the last generated
//! [`LensMaps`] keyed by the fields that affect pixels (size, mode, and
//! magnification response). Scale, blur, opacity, and saturation changes
//! reuse the cached maps and only rebuild the graph.

use std::sync::Arc;

use crate::displacement::MagnifyResponse;
use crate::filter::{self, FilterGraph};
use crate::types::{Dimensions, LensError, LensMaps, LensParameters, MapMode};

/// The parameters that determine raster content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapKey {
    /// Raster size.
    pub dimensions: Dimensions,
    /// Map mode.
    pub mode: MapMode,
    /// Magnification response.
    pub magnify_response: MagnifyResponse,
}

impl MapKey {
    /// Extract the shape-affecting fields of `params`.
    #[must_use]
    pub const fn of(params: &LensParameters) -> Self {
        Self {
            dimensions: params.dimensions(),
            mode: params.mode,
            magnify_response: params.magnify_response,
        }
    }
}

/// Result of [`MapCache::update`].
#[derive(Debug, Clone)]
pub struct LensUpdate {
    /// Maps backing the graph's source buffers.
    pub maps: Arc<LensMaps>,
    /// Graph for the requested parameters.
    pub graph: FilterGraph,
    /// Whether rasters were regenerated for this update.
    pub regenerated: bool,
}

/// Holds the most recently generated maps.
#[derive(Debug, Default)]
pub struct MapCache {
    entry: Option<(MapKey, Arc<LensMaps>)>,
    regenerations: u64,
}

impl MapCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps for `params`, generating them only on a key change.
    ///
    /// Returns the maps and whether they were regenerated.
    ///
    /// # Errors
    ///
    /// Returns any error from map generation. The previous entry is kept
    /// when generation fails.
    pub fn maps(&mut self, params: &LensParameters) -> Result<(Arc<LensMaps>, bool), LensError> {
        let key = MapKey::of(params);
        if let Some((cached, maps)) = &self.entry
            && *cached == key
        {
            tracing::debug!(?key, "map cache hit");
            return Ok((Arc::clone(maps), false));
        }

        tracing::debug!(?key, "map cache miss, generating maps");
        let maps = Arc::new(crate::generate_maps(params)?);
        self.entry = Some((key, Arc::clone(&maps)));
        self.regenerations += 1;
        Ok((maps, true))
    }

    /// Validate `params`, fetch or regenerate maps, and build the graph.
    ///
    /// # Errors
    ///
    /// Returns [`LensError`] if `params` is invalid or a stage fails. The
    /// cache is untouched when validation fails.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn update(&mut self, params: &LensParameters) -> Result<LensUpdate, LensError> {
        params.validate()?;
        let (maps, regenerated) = self.maps(params)?;
        let graph = filter::build(params, &maps)?;
        Ok(LensUpdate {
            maps,
            graph,
            regenerated,
        })
    }

    /// Drop the cached maps.
    pub fn invalidate(&mut self) {
        self.entry = None;
    }

    /// Key of the cached maps, if any.
    #[must_use]
    pub fn cached_key(&self) -> Option<MapKey> {
        self.entry.as_ref().map(|(key, _)| *key)
    }

    /// How many times maps have been generated.
    #[must_use]
    pub const fn regenerations(&self) -> u64 {
        self.regenerations
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn params() -> LensParameters {
        LensParameters {
            width: 50,
            height: 24,
            ..LensParameters::default()
        }
    }

    #[test]
    fn first_update_generates() {
        let mut cache = MapCache::new();
        let update = cache.update(&params()).unwrap();
        assert!(update.regenerated);
        assert_eq!(cache.regenerations(), 1);
        assert_eq!(cache.cached_key(), Some(MapKey::of(&params())));
    }

    #[test]
    fn non_shape_changes_reuse_maps() {
        let mut cache = MapCache::new();
        let first = cache.update(&params()).unwrap();

        for tweak in [
            LensParameters {
                specular_opacity: 0.1,
                ..params()
            },
            LensParameters {
                saturation: 2.0,
                ..params()
            },
            LensParameters {
                refraction_scale: 10.0,
                magnify_scale: 3.0,
                magnify_blur: 2.0,
                ..params()
            },
        ] {
            let update = cache.update(&tweak).unwrap();
            assert!(!update.regenerated);
            assert!(Arc::ptr_eq(&update.maps, &first.maps));
        }
        assert_eq!(cache.regenerations(), 1);
    }

    #[test]
    fn shape_changes_regenerate() {
        let mut cache = MapCache::new();
        cache.update(&params()).unwrap();

        for changed in [
            LensParameters {
                width: 51,
                ..params()
            },
            LensParameters {
                width: 51,
                mode: MapMode::Combined,
                ..params()
            },
            LensParameters {
                width: 51,
                mode: MapMode::Combined,
                magnify_response: MagnifyResponse::EllipticalCenter,
                ..params()
            },
        ] {
            assert!(cache.update(&changed).unwrap().regenerated);
        }
        assert_eq!(cache.regenerations(), 4);
    }

    #[test]
    fn invalid_update_keeps_previous_entry() {
        let mut cache = MapCache::new();
        cache.update(&params()).unwrap();
        let bad = LensParameters {
            height: 0,
            ..params()
        };
        assert!(matches!(cache.update(&bad), Err(LensError::InvalidShape(_))));
        assert_eq!(cache.cached_key(), Some(MapKey::of(&params())));
        assert!(!cache.update(&params()).unwrap().regenerated);
    }

    #[test]
    fn invalidate_forces_regeneration() {
        let mut cache = MapCache::new();
        cache.update(&params()).unwrap();
        cache.invalidate();
        assert!(cache.cached_key().is_none());
        assert!(cache.update(&params()).unwrap().regenerated);
        assert_eq!(cache.regenerations(), 2);
    }
}
