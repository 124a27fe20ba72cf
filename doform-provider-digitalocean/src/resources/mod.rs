//! Managed resource kinds
//!
//! One module per DigitalOcean object family. Each kind implements
//! [`ResourceLifecycle`] and is registered on the provider through [`all`].

use std::sync::Arc;

use crate::lifecycle::ResourceLifecycle;

pub mod cdn;
pub mod certificate;
pub mod container_registry;
pub mod database;
pub mod domain;
pub mod droplet;
pub mod firewall;
pub mod kubernetes_cluster;
pub mod loadbalancer;
pub mod monitor_alert;
pub mod project;
pub mod record;
pub mod reserved_ip;
pub mod reserved_ip_assignment;
pub mod spaces_bucket;
pub mod ssh_key;
pub mod tag;
pub mod volume;
pub mod vpc;

use database::{ChildKind, DatabaseChild};
use reserved_ip::{IpKind, ReservedIp};

/// Returns every resource kind supported by this provider
pub fn all() -> Vec<Arc<dyn ResourceLifecycle>> {
    vec![
        Arc::new(droplet::Droplet),
        Arc::new(ssh_key::SshKey),
        Arc::new(tag::Tag),
        Arc::new(vpc::Vpc),
        Arc::new(domain::Domain),
        Arc::new(record::Record),
        Arc::new(certificate::Certificate),
        Arc::new(loadbalancer::LoadBalancer),
        Arc::new(ReservedIp { kind: IpKind::Reserved }),
        Arc::new(ReservedIp { kind: IpKind::Floating }),
        Arc::new(reserved_ip_assignment::ReservedIpAssignment),
        Arc::new(volume::Volume),
        Arc::new(volume::VolumeAttachment),
        Arc::new(volume::VolumeSnapshot),
        Arc::new(firewall::Firewall),
        Arc::new(database::DatabaseCluster),
        Arc::new(DatabaseChild { kind: ChildKind::Db }),
        Arc::new(DatabaseChild { kind: ChildKind::User }),
        Arc::new(DatabaseChild { kind: ChildKind::ConnectionPool }),
        Arc::new(DatabaseChild { kind: ChildKind::Replica }),
        Arc::new(project::Project),
        Arc::new(project::ProjectResources),
        Arc::new(cdn::Cdn),
        Arc::new(container_registry::ContainerRegistry),
        Arc::new(monitor_alert::MonitorAlert),
        Arc::new(kubernetes_cluster::KubernetesCluster),
        Arc::new(spaces_bucket::SpacesBucket),
        Arc::new(spaces_bucket::SpacesBucketPolicy),
    ]
}
