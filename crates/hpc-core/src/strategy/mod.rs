//! Command builders for the configurable resolver and installer.

pub mod installer;
pub mod resolver;

pub use installer::{installer_for, project_install_args, InstallContext, InstallerStrategy};
pub use resolver::{resolver_for, ResolverInvocation, ResolverStrategy};
