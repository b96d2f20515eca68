use std::sync::Arc;

use crate::container_manager::ContainerManager;
use crate::database::DbPool;
use crate::provisioner::Provisioner;
use crate::secretbox::SecretBox;

#[derive(Clone)]
pub struct ControlApiState {
    pub pool: DbPool,
    pub secretbox: Arc<SecretBox>,
    pub containers: Arc<ContainerManager>,
    pub provisioner: Arc<Provisioner>,
}
