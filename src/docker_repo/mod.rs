// Local Docker host scanning via bollard

mod stats;

use crate::models::{ContainerSnapshot, ContainerState, Host};
use bollard::Docker;
use bollard::query_parameters::{InspectContainerOptions, ListContainersOptions, StatsOptions};
use bollard::models::ContainerSummary;
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use futures_util::future::join_all;
use stats::{ContainerUsage, process_statistics};

pub struct DockerRepo {
    docker: Docker,
}

impl DockerRepo {
    pub fn connect() -> anyhow::Result<Self> {
        let docker = Docker::connect_with_unix_defaults()?;
        Ok(Self { docker })
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        self.docker.ping().await?;
        Ok(())
    }

    /// Snapshots every container on the host, running or not, all stamped with one scan time.
    /// Resource figures are only collected for running containers when the host collects stats.
    pub async fn scan(&self, host: &Host) -> anyhow::Result<Vec<ContainerSnapshot>> {
        let options = ListContainersOptions {
            all: true,
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;
        let scanned_at = Utc::now();

        let snapshots = join_all(
            containers
                .iter()
                .map(|c| self.snapshot(c, host, scanned_at)),
        )
        .await;
        Ok(snapshots)
    }

    async fn snapshot(
        &self,
        c: &ContainerSummary,
        host: &Host,
        scanned_at: DateTime<Utc>,
    ) -> ContainerSnapshot {
        let id = c.id.clone().unwrap_or_default();
        let name = c
            .names
            .as_ref()
            .and_then(|n| n.first())
            .cloned()
            .unwrap_or_else(|| id.clone());
        let name = name.trim_start_matches('/').to_string();
        let state = c
            .state
            .as_ref()
            .map(|s| ContainerState::from_docker(&s.to_string()))
            .unwrap_or(ContainerState::Unknown);

        let usage = if state == ContainerState::Running && host.collect_stats {
            self.usage(&id, &name).await
        } else {
            ContainerUsage::default()
        };

        ContainerSnapshot {
            restart_count: self.restart_count(&id, &name).await,
            id,
            name,
            host_id: host.id,
            host_name: host.name.clone(),
            image: c.image.clone().unwrap_or_default(),
            image_id: c.image_id.clone().unwrap_or_default(),
            state,
            cpu_percent: usage.cpu_percent,
            memory_usage: usage.memory_usage,
            memory_limit: usage.memory_limit,
            memory_percent: usage.memory_percent,
            scanned_at,
        }
    }

    /// One non-streaming stats read; Docker samples twice so CPU deltas are populated.
    async fn usage(&self, id: &str, name: &str) -> ContainerUsage {
        let options = StatsOptions {
            stream: false,
            ..Default::default()
        };
        let mut stream = self.docker.stats(id, Some(options));
        match stream.next().await {
            Some(Ok(s)) => process_statistics(&s).unwrap_or_default(),
            Some(Err(e)) => {
                tracing::warn!(error = %e, container = %name, "docker stats failed");
                ContainerUsage::default()
            }
            None => ContainerUsage::default(),
        }
    }

    async fn restart_count(&self, id: &str, name: &str) -> u32 {
        match self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
        {
            Ok(info) => info.restart_count.unwrap_or(0).clamp(0, u32::MAX as i64) as u32,
            Err(e) => {
                tracing::debug!(error = %e, container = %name, "docker inspect failed");
                0
            }
        }
    }
}
