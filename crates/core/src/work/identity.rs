// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Known work queue identities
//!
//! Each identity carries its display name, the tunable that sizes it and the
//! worker count used when the tunable is not set. Producers refer to a queue
//! either by identity or by the name of their callback.

use serde::Serialize;
use std::fmt;

/// Logical identity of a work queue
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum QueueId {
    MavenMetadata,
    PluginMavenMetadata,
    YumVirtualMetadata,
    RpmMetadata,
    HelmMetadata,
    HelmVirtualUrlMetadata,
    ComposerMetadataExtraction,
    ComposerMetadata,
    DebianMetadata,
    PuppetMetadata,
    PuppetRepositoryMetadata,
    ChefMetadata,
    EventBasedReplication,
    BuildRetention,
    Sha256Migration,
    PathChecksumMigration,
    HaMessages,
}

impl QueueId {
    pub const ALL: [QueueId; 17] = [
        QueueId::MavenMetadata,
        QueueId::PluginMavenMetadata,
        QueueId::YumVirtualMetadata,
        QueueId::RpmMetadata,
        QueueId::HelmMetadata,
        QueueId::HelmVirtualUrlMetadata,
        QueueId::ComposerMetadataExtraction,
        QueueId::ComposerMetadata,
        QueueId::DebianMetadata,
        QueueId::PuppetMetadata,
        QueueId::PuppetRepositoryMetadata,
        QueueId::ChefMetadata,
        QueueId::EventBasedReplication,
        QueueId::BuildRetention,
        QueueId::Sha256Migration,
        QueueId::PathChecksumMigration,
        QueueId::HaMessages,
    ];

    /// Queue name shown in monitoring and logs
    pub fn display_name(&self) -> &'static str {
        match self {
            QueueId::MavenMetadata => "Maven Metadata",
            QueueId::PluginMavenMetadata => "Plugin Maven Metadata",
            QueueId::YumVirtualMetadata => "Yum Virtual Metadata",
            QueueId::RpmMetadata => "Rpm Metadata",
            QueueId::HelmMetadata => "Helm Metadata",
            QueueId::HelmVirtualUrlMetadata => "Helm Virtual Url Metadata",
            QueueId::ComposerMetadataExtraction => "Composer Metadata Extraction",
            QueueId::ComposerMetadata => "Composer Metadata",
            QueueId::DebianMetadata => "Debian Metadata",
            QueueId::PuppetMetadata => "Puppet Metadata",
            QueueId::PuppetRepositoryMetadata => "Puppet Repository Metadata",
            QueueId::ChefMetadata => "Chef Metadata",
            QueueId::EventBasedReplication => "Event Based Replication",
            QueueId::BuildRetention => "Build Retention Job",
            QueueId::Sha256Migration => "SHA256 Migration",
            QueueId::PathChecksumMigration => "Path Checksum Migration",
            QueueId::HaMessages => "HA event messages",
        }
    }

    /// Tunable holding this queue's worker count
    pub fn workers_key(&self) -> &'static str {
        match self {
            QueueId::MavenMetadata => "mvn.metadata.calculation.workers",
            QueueId::PluginMavenMetadata => "mvn.metadata.plugin.calculation.workers",
            QueueId::YumVirtualMetadata => "yum.virtual.metadata.calculation.workers",
            QueueId::RpmMetadata => "rpm.metadata.calculation.workers",
            QueueId::HelmMetadata => "helm.metadata.calculation.workers",
            QueueId::HelmVirtualUrlMetadata => "helm.virtual.url.metadata.calculation.workers",
            QueueId::ComposerMetadataExtraction => "composer.metadata.extractor.workers",
            QueueId::ComposerMetadata => "composer.metadata.index.workers",
            QueueId::DebianMetadata => "debian.metadata.calculation.workers",
            QueueId::PuppetMetadata => "puppet.metadata.calculation.workers",
            QueueId::PuppetRepositoryMetadata => "puppet.repo.metadata.calculation.workers",
            QueueId::ChefMetadata => "chef.metadata.index.workers",
            QueueId::EventBasedReplication => "replications.eventbased.workers",
            QueueId::BuildRetention => "build.retention.workers",
            QueueId::Sha256Migration => "sha2.migration.job.queue.workers",
            QueueId::PathChecksumMigration => "pathChecksum.migration.job.queue.workers",
            QueueId::HaMessages => "ha.messages.workers",
        }
    }

    /// Worker count used when the tunable is not set
    pub fn default_workers(&self) -> i64 {
        match self {
            QueueId::MavenMetadata => 8,
            QueueId::PluginMavenMetadata => 2,
            QueueId::YumVirtualMetadata => 5,
            QueueId::RpmMetadata => 8,
            QueueId::HelmMetadata => 2,
            QueueId::HelmVirtualUrlMetadata => 2,
            QueueId::ComposerMetadataExtraction => 20,
            QueueId::ComposerMetadata => 10,
            QueueId::DebianMetadata => 8,
            QueueId::PuppetMetadata => 5,
            QueueId::PuppetRepositoryMetadata => 5,
            QueueId::ChefMetadata => 10,
            QueueId::EventBasedReplication => 8,
            QueueId::BuildRetention => 10,
            QueueId::Sha256Migration => 2,
            QueueId::PathChecksumMigration => 2,
            QueueId::HaMessages => 10,
        }
    }

    /// Queue serving the producer callback `name`
    pub fn from_callback(name: &str) -> Option<QueueId> {
        let id = match name {
            "calculateMavenMetadataAsync" => QueueId::MavenMetadata,
            "calculateMavenPluginsMetadataAsync" => QueueId::PluginMavenMetadata,
            "calculateYumVirtualMetadataAsync" | "calculateYumVirtualMetadata" => {
                QueueId::YumVirtualMetadata
            }
            "calculateRpmMetadataAsync" | "calculateRpmMetadataSync" => QueueId::RpmMetadata,
            "calculateHelmMetadataAsync" | "calculateHelmMetadataSync" => QueueId::HelmMetadata,
            "calculateVirtualUrlHelmMetadataAsync" | "calculateVirtualUrlHelmMetadataSync" => {
                QueueId::HelmVirtualUrlMetadata
            }
            "handlePackageDeployment" | "handlePackageDeletion" => {
                QueueId::ComposerMetadataExtraction
            }
            "extractAndIndexAllComposerPackages" | "indexComposerPackageAndRepo" => {
                QueueId::ComposerMetadata
            }
            "calculateDebianMetadataInternalAsync" | "calculateDebianMetadataInternalSync" => {
                QueueId::DebianMetadata
            }
            "calculatePuppetMetadataAsync" => QueueId::PuppetMetadata,
            "calculatePuppetRepoMetadataAsync" => QueueId::PuppetRepositoryMetadata,
            "extractAndIndexChefCookbooks"
            | "extractAndIndexSingleChefCookbook"
            | "calculateVirtualRepoMetadata" => QueueId::ChefMetadata,
            "offerRemoteReplicationEventInternal" | "putInboundReplicationEventsInternal" => {
                QueueId::EventBasedReplication
            }
            "deleteBuildAsync" => QueueId::BuildRetention,
            "updateSha2" => QueueId::Sha256Migration,
            "updateRepoPathChecksum" => QueueId::PathChecksumMigration,
            "notifyAsync" => QueueId::HaMessages,
            _ => return None,
        };
        Some(id)
    }

    /// Queue sized by the tunable `key`
    pub fn from_workers_key(key: &str) -> Option<QueueId> {
        QueueId::ALL
            .into_iter()
            .find(|id| id.workers_key() == key)
    }
}

impl fmt::Display for QueueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
#[path = "identity_tests.rs"]
mod tests;
