// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::result::Result;

use crate::error::PublisherError;

/// A trait that handles the loading / saving and validity of configuration information for a
/// publisher.
pub trait Config: serde::Serialize {
    fn save(&self, path: &Path) -> Result<(), PublisherError> {
        if !self.is_valid() {
            error!("Config isn't valid and won't be saved");
            return Err(PublisherError::Config(
                "config isn't valid and won't be saved".into(),
            ));
        }
        let s = serde_yaml::to_string(&self).map_err(|err| {
            error!("Cannot serialize configuration, error reason: {}", err);
            PublisherError::Config(err.to_string())
        })?;
        let mut f = File::create(path).map_err(|err| {
            error!("Cannot create the path {} to save the config", path.display());
            PublisherError::Io(err)
        })?;
        f.write_all(s.as_bytes()).map_err(|err| {
            error!("Could not save config - error = {:?}", err);
            PublisherError::Io(err)
        })
    }

    fn load<A>(path: &Path) -> Result<A, PublisherError>
    where
        for<'de> A: Config + serde::Deserialize<'de>,
    {
        let mut f = File::open(path).map_err(|err| {
            error!("Cannot open configuration file {}", path.to_string_lossy());
            PublisherError::Io(err)
        })?;
        let mut s = String::new();
        f.read_to_string(&mut s).map_err(|err| {
            error!(
                "Cannot read configuration file {} to string",
                path.to_string_lossy()
            );
            PublisherError::Io(err)
        })?;
        let config: A = serde_yaml::from_str(&s).map_err(|err| {
            error!(
                "Cannot deserialize configuration from {}, error reason: {}",
                path.to_string_lossy(),
                err
            );
            PublisherError::Config(err.to_string())
        })?;
        if config.is_valid() {
            Ok(config)
        } else {
            Err(PublisherError::Config(format!(
                "configuration in {} is not valid",
                path.to_string_lossy()
            )))
        }
    }

    fn is_valid(&self) -> bool;
}
