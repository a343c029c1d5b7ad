// Copyright ⓒ 2025 Tandem Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Java property style configuration.
//!
//! Clients are configured from `key=value` property maps as the
//! compatibility suites supply them. Unrecognised keys are an error
//! rather than silently ignored.

use std::{str::FromStr, time::Duration};

use url::Url;

use crate::{Error, Result};

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Serde {
    #[default]
    String,
    Bytes,
}

impl FromStr for Serde {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "string" => Ok(Self::String),
            "bytes" => Ok(Self::Bytes),
            otherwise => Err(Error::Message(format!("unknown serde: {otherwise}"))),
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Configuration {
    bootstrap_servers: Url,
    group_id: Option<String>,
    enable_auto_commit: bool,
    key_serde: Serde,
    value_serde: Serde,
    acknowledgments_group_time: Duration,
}

impl Configuration {
    /// Build from property pairs. `bootstrap.servers` is required,
    /// everything else has the defaults the compatibility suites
    /// assume.
    pub fn from_properties<'a, I>(properties: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut bootstrap_servers = None;
        let mut group_id = None;
        let mut enable_auto_commit = true;
        let mut key_serde = Serde::default();
        let mut value_serde = Serde::default();
        let mut acknowledgments_group_time = Duration::ZERO;

        for (key, value) in properties {
            match key {
                "bootstrap.servers" => bootstrap_servers = Some(Url::parse(value)?),
                "group.id" => group_id = Some(value.to_owned()),
                "enable.auto.commit" => enable_auto_commit = value.parse()?,
                "key.serializer" | "key.deserializer" => key_serde = value.parse()?,
                "value.serializer" | "value.deserializer" => value_serde = value.parse()?,
                "acknowledgments.group.time.millis" => {
                    acknowledgments_group_time = Duration::from_millis(value.parse()?)
                }
                otherwise => return Err(Error::UnrecognisedProperty(otherwise.to_owned())),
            }
        }

        bootstrap_servers
            .ok_or(Error::Message(String::from(
                "bootstrap.servers is required",
            )))
            .map(|bootstrap_servers| Self {
                bootstrap_servers,
                group_id,
                enable_auto_commit,
                key_serde,
                value_serde,
                acknowledgments_group_time,
            })
    }

    pub fn bootstrap_servers(&self) -> &Url {
        &self.bootstrap_servers
    }

    pub fn group_id(&self) -> Option<&str> {
        self.group_id.as_deref()
    }

    pub fn enable_auto_commit(&self) -> bool {
        self.enable_auto_commit
    }

    pub fn key_serde(&self) -> Serde {
        self.key_serde
    }

    pub fn value_serde(&self) -> Serde {
        self.value_serde
    }

    pub fn acknowledgments_group_time(&self) -> Duration {
        self.acknowledgments_group_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn recognised_properties() -> Result<()> {
        let configuration = Configuration::from_properties([
            ("bootstrap.servers", "tcp://localhost:9092"),
            ("group.id", "my-subscription-name"),
            ("enable.auto.commit", "false"),
            ("key.serializer", "string"),
            ("value.deserializer", "bytes"),
            ("acknowledgments.group.time.millis", "50"),
        ])?;

        assert_eq!(Some("my-subscription-name"), configuration.group_id());
        assert!(!configuration.enable_auto_commit());
        assert_eq!(Serde::String, configuration.key_serde());
        assert_eq!(Serde::Bytes, configuration.value_serde());
        assert_eq!(
            Duration::from_millis(50),
            configuration.acknowledgments_group_time()
        );

        Ok(())
    }

    #[test]
    fn unrecognised_property_is_rejected() {
        assert!(matches!(
            Configuration::from_properties([
                ("bootstrap.servers", "tcp://localhost:9092"),
                ("auto.offset.rest", "earliest"),
            ]),
            Err(Error::UnrecognisedProperty(key)) if key == "auto.offset.rest"
        ));
    }

    #[test]
    fn bootstrap_servers_is_required() {
        assert!(Configuration::from_properties([("group.id", "grp")]).is_err());
    }
}
