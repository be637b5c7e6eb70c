//! Enumerated configuration options (spec.md §6).
//!
//! Mirrors the teacher's `header::Builder`: every option is a public field
//! with a sensible default, constructed either with [`Config::default`] or
//! parsed from the ASCII `KEY=VALUE` pairs the original handler's `.conf`
//! files use (see `original_source/HDFSP.cc`'s `TheBESKeys` lookups).

#![forbid(unsafe_code)]

use std::path::PathBuf;

/// All configuration knobs spec.md §6 lists, each optional with the
/// documented default.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// `EnablePassFileID`: true means the embedding server owns the HDF4
    /// handle; false means this crate opens/closes per read.
    pub pass_file_id: bool,

    /// `EnableEOSGeoCacheFile`: enable the on-disk lat/lon cache.
    pub eos_geo_cache_file: bool,

    /// `EnableDataCacheFile`: enable the on-disk raw-data cache.
    pub data_cache_file: bool,

    /// `EnableMetaDataCacheFile`: serialize the `Catalog` to a side file for
    /// reuse across opens of the same file.
    pub metadata_cache_file: bool,

    /// `EnableVdataToAttr`: map small Vdatas (record count at or below
    /// [`Config::vdata_to_attr_threshold`]) to attributes instead of
    /// variables.
    pub vdata_to_attr: bool,

    /// The record-count threshold used by `vdata_to_attr`. Spec.md §4.1
    /// default is 10.
    pub vdata_to_attr_threshold: u32,

    /// `EnableCERESMERRAShortName`: drop the path prefix from CERES/MERRA
    /// variable names.
    pub ceres_merra_short_name: bool,

    /// `DisableVdataNameclashingCheck`: skip the clash-resolution phase
    /// (spec.md §4.3 phase 5) for Vdata-derived variables.
    pub disable_vdata_nameclashing_check: bool,

    /// `CacheDir`: directory backing the subset cache.
    pub cache_dir: PathBuf,

    /// `CachePrefix`: filename prefix for cache entries.
    pub cache_prefix: String,

    /// `CacheSize`: eviction cap, in bytes.
    pub cache_size_bytes: u64,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            pass_file_id: false,
            eos_geo_cache_file: false,
            data_cache_file: false,
            metadata_cache_file: false,
            vdata_to_attr: true,
            vdata_to_attr_threshold: 10,
            ceres_merra_short_name: false,
            disable_vdata_nameclashing_check: false,
            cache_dir: PathBuf::from("/tmp/hdf4_cf_cache"),
            cache_prefix: String::from("hdf4_cf_"),
            cache_size_bytes: 20 * 1024 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Parses `KEY=VALUE` pairs (one per line, `#`-prefixed comments and
    /// blank lines ignored), the format the original handler's `.conf`
    /// files use. Unknown keys are ignored; malformed boolean/integer
    /// values are ignored and the default is kept, matching the "all
    /// optional" framing of spec.md §6.
    ///
    /// # Examples
    ///
    /// ```
    /// use hdf4_cf::Config;
    /// let config = Config::from_pairs(
    ///     "EnableEOSGeoCacheFile=true\nCacheSize=1048576\n# a comment\n",
    /// );
    /// assert!(config.eos_geo_cache_file);
    /// assert_eq!(1_048_576, config.cache_size_bytes);
    /// ```
    pub fn from_pairs(text: &str) -> Config {
        let mut config = Config::default();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim();
            match key {
                "EnablePassFileID" => config.pass_file_id = parse_bool(value, config.pass_file_id),
                "EnableEOSGeoCacheFile" => {
                    config.eos_geo_cache_file = parse_bool(value, config.eos_geo_cache_file)
                }
                "EnableDataCacheFile" => {
                    config.data_cache_file = parse_bool(value, config.data_cache_file)
                }
                "EnableMetaDataCacheFile" => {
                    config.metadata_cache_file = parse_bool(value, config.metadata_cache_file)
                }
                "EnableVdataToAttr" => {
                    config.vdata_to_attr = parse_bool(value, config.vdata_to_attr)
                }
                "EnableCERESMERRAShortName" => {
                    config.ceres_merra_short_name = parse_bool(value, config.ceres_merra_short_name)
                }
                "DisableVdataNameclashingCheck" => {
                    config.disable_vdata_nameclashing_check =
                        parse_bool(value, config.disable_vdata_nameclashing_check)
                }
                "CacheDir" => config.cache_dir = PathBuf::from(value),
                "CachePrefix" => config.cache_prefix = value.to_string(),
                "CacheSize" => {
                    if let Ok(n) = value.parse() {
                        config.cache_size_bytes = n;
                    }
                }
                _ => trace!("ignoring unrecognized configuration key {key:?}"),
            }
        }
        config
    }
}

fn parse_bool(value: &str, default: bool) -> bool {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => true,
        "false" | "no" | "0" => false,
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(!config.pass_file_id);
        assert_eq!(10, config.vdata_to_attr_threshold);
    }

    #[test]
    fn parses_pairs() {
        let config = Config::from_pairs(
            "EnablePassFileID=true\n\
             # comment\n\
             CachePrefix=foo_\n\
             CacheSize=100\n",
        );
        assert!(config.pass_file_id);
        assert_eq!("foo_", config.cache_prefix);
        assert_eq!(100, config.cache_size_bytes);
    }

    #[test]
    fn unknown_keys_ignored() {
        let config = Config::from_pairs("SomeOtherModule.Key=whatever\n");
        assert_eq!(Config::default(), config);
    }
}
