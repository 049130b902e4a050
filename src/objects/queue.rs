use crate::backend::Backend;
use crate::error::Result;
use crate::handle::{Handle, NativeHandle};
use crate::objects::{CommandBuffer, CommandPool, Fence, Semaphore};
use crate::registry::{DeviceObject, Objects};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueueKind {
    Graphics,
    Compute,
    Transfer,
}

#[derive(Clone, Copy, Debug)]
pub struct QueueCreateInfo {
    pub kind: QueueKind,
    /// Index within the kind.
    pub index: u32,
}

pub struct Queue {
    native: NativeHandle,
    pub kind: QueueKind,
    pub index: u32,
    /// Pool the device allocates this queue's command buffers from.
    pub(crate) command_pool: Handle<CommandPool>,
}

impl DeviceObject for Queue {
    type CreateInfo = QueueCreateInfo;

    fn allocate(info: &QueueCreateInfo, _objects: &Objects, backend: &mut dyn Backend) -> Result<Self> {
        Ok(Self {
            native: backend.allocate_queue(info)?,
            kind: info.kind,
            index: info.index,
            command_pool: Handle::null(),
        })
    }

    fn native(&self) -> NativeHandle {
        self.native
    }
}

/// One queue submission: command buffers run in order, after every wait
/// semaphore, and signal every signal semaphore plus the optional fence.
#[derive(Clone, Debug, Default)]
pub struct SubmitInfo {
    pub command_buffers: Vec<Handle<CommandBuffer>>,
    pub wait_semaphores: Vec<Handle<Semaphore>>,
    pub signal_semaphores: Vec<Handle<Semaphore>>,
    pub fence: Option<Handle<Fence>>,
}

impl SubmitInfo {
    /// Submission with no work whose only effect is signaling.
    pub fn signal_only(semaphore: Option<Handle<Semaphore>>, fence: Option<Handle<Fence>>) -> Self {
        Self {
            signal_semaphores: semaphore.into_iter().collect(),
            fence,
            ..Default::default()
        }
    }
}
