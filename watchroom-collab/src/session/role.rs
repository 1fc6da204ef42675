use std::time::Instant;

use watchroom_core::{earliest, Config, HostLinks, HostSync, Role, ViewerLink, ViewerSync};

/// The role-specific half of a session.
#[derive(Debug)]
pub enum RoleState {
    Host(HostRole),
    Viewer(ViewerRole),
}

#[derive(Debug)]
pub struct HostRole {
    /// Exists once a media source was selected.
    pub sync: Option<HostSync>,
    pub links: HostLinks,
}

#[derive(Debug)]
pub struct ViewerRole {
    pub sync: ViewerSync,
    pub link: ViewerLink,
    /// The label of the host's media, as announced.
    pub media_label: Option<String>,
}

impl RoleState {
    pub fn new(role: Role, config: &Config) -> Self {
        match role {
            Role::Host => Self::Host(HostRole {
                sync: None,
                links: HostLinks::new(config),
            }),
            Role::Viewer => Self::Viewer(ViewerRole {
                sync: ViewerSync::new(config),
                link: ViewerLink::new(config),
                media_label: None,
            }),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::Host(_) => Role::Host,
            Self::Viewer(_) => Role::Viewer,
        }
    }

    pub fn is_host(&self) -> bool {
        matches!(self, Self::Host(_))
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match self {
            Self::Host(host) => host.links.next_deadline(),
            Self::Viewer(viewer) => {
                earliest([viewer.sync.next_deadline(), viewer.link.next_deadline()])
            }
        }
    }
}
