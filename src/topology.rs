// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Service topology manifest.
//!
//! An Overleaf deployment is composed of three cooperating services:
//!
//! 1. `sharelatex`: the Overleaf application itself, exposed on the
//!    requested port.
//! 2. `mongo`: the document store, started as a replica set member.
//! 3. `redis`: the in-memory cache.
//!
//! Everything about the topology is fixed except the externally exposed port
//! and the site URL derived from the validated host. The manifest is written
//! in Docker Compose format.

use crate::{host::HostSpec, materialize::ENV_FILE_NAME};

use serde::Serialize;
use std::collections::BTreeMap;

const APP_IMAGE: &str = "sharelatex/sharelatex";
const DATABASE_IMAGE: &str = "mongo:6.0";
const CACHE_IMAGE: &str = "redis:6.2";

/// Name of the replica set the database joins.
pub const REPLICA_SET: &str = "overleaf";

/// Compose service name of the database, also its address on the stack network.
pub const DATABASE_SERVICE: &str = "mongo";

/// Port the database listens on inside the stack network.
pub const DATABASE_PORT: u16 = 27017;

/// Compose manifest describing the whole deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceTopology {
    services: Services,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct Services {
    sharelatex: Service,
    mongo: Service,
    redis: Service,
}

/// Single compose service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Service {
    image: String,
    container_name: String,
    restart: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    depends_on: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    links: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    ports: Vec<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    env_file: Vec<String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    environment: BTreeMap<String, String>,

    volumes: Vec<String>,
}

impl Service {
    fn new(image: &str, name: &str) -> Self {
        Self {
            image: image.into(),
            container_name: name.into(),
            restart: "always".into(),
            command: None,
            depends_on: Vec::new(),
            links: Vec::new(),
            ports: Vec::new(),
            env_file: Vec::new(),
            environment: BTreeMap::new(),
            volumes: Vec::new(),
        }
    }
}

impl ServiceTopology {
    /// Construct topology exposing the application for target host.
    ///
    /// The database container gets named `database_container`, which is what
    /// replica set initialization execs into.
    pub fn new(domain: &HostSpec, database_container: &str) -> Self {
        let mut app = Service::new(APP_IMAGE, "sharelatex");
        app.depends_on = vec![DATABASE_SERVICE.into(), "redis".into()];
        app.links = app.depends_on.clone();
        app.ports = vec![format!("{}:80", domain.port())];
        app.env_file = vec![ENV_FILE_NAME.into()];
        app.environment
            .insert("OVERLEAF_SITE_URL".into(), domain.url());
        app.volumes = vec![
            "./data/sharelatex:/var/lib/overleaf".into(),
            "./logs/sharelatex:/var/log/overleaf".into(),
        ];

        let mut database = Service::new(DATABASE_IMAGE, database_container);
        database.command = Some(format!("--replSet {REPLICA_SET}"));
        database.volumes = vec!["./data/mongo:/data/db".into()];

        let mut cache = Service::new(CACHE_IMAGE, "redis");
        cache.volumes = vec!["./data/redis:/data".into()];

        Self {
            services: Services {
                sharelatex: app,
                mongo: database,
                redis: cache,
            },
        }
    }

    /// Render topology as compose YAML.
    ///
    /// # Errors
    ///
    /// - Return [`serde_yaml::Error`] if serialization fails.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
