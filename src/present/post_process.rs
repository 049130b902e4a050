// PostProcess - one command buffer and one semaphore per image index
//
// Each frame: record into the image's command buffer, submit it after the
// caller's semaphores, and hand the image's semaphore on to the next present.

use crate::device::Device;
use crate::error::{Error, Result};
use crate::handle::Handle;
use crate::objects::{CommandBuffer, CommandRecorder, Queue, Semaphore, SemaphoreCreateInfo, SubmitInfo};
use std::sync::Arc;

pub struct PostProcess {
    device: Arc<Device>,
    queue: Handle<Queue>,
    command_buffers: Vec<Handle<CommandBuffer>>,
    semaphores: Vec<Handle<Semaphore>>,
}

impl PostProcess {
    pub fn new(device: Arc<Device>, queue: Handle<Queue>, image_count: u32) -> Result<Self> {
        let mut post_process = Self {
            device,
            queue,
            command_buffers: Vec::new(),
            semaphores: Vec::new(),
        };
        post_process.allocate(image_count)?;
        Ok(post_process)
    }

    fn allocate(&mut self, image_count: u32) -> Result<()> {
        for _ in 0..image_count {
            self.command_buffers.push(self.device.create_command_buffer(self.queue, 0, 0)?);
            self.semaphores
                .push(self.device.create_semaphore(&SemaphoreCreateInfo::default())?);
        }
        Ok(())
    }

    pub fn queue(&self) -> Handle<Queue> {
        self.queue
    }

    pub fn image_count(&self) -> u32 {
        self.command_buffers.len() as u32
    }

    pub fn command_buffer(&self, image_index: u32) -> Result<Handle<CommandBuffer>> {
        self.command_buffers
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| Error::out_of_range("post-process command buffer", image_index, self.command_buffers.len()))
    }

    pub fn semaphore(&self, image_index: u32) -> Result<Handle<Semaphore>> {
        self.semaphores
            .get(image_index as usize)
            .copied()
            .ok_or_else(|| Error::out_of_range("post-process semaphore", image_index, self.semaphores.len()))
    }

    /// Match a new image count. Drains the queue first when anything changes.
    pub fn resize(&mut self, image_count: u32) -> Result<()> {
        if image_count == self.image_count() {
            return Ok(());
        }
        self.device.queue_wait_idle(self.queue)?;
        self.release();
        self.allocate(image_count)
    }

    /// Record `record` into the command buffer of `image_index` and submit it
    /// after `wait_semaphores`. Returns the semaphore the submission signals.
    pub fn submit<F>(
        &mut self,
        image_index: u32,
        wait_semaphores: &[Handle<Semaphore>],
        record: F,
    ) -> Result<Handle<Semaphore>>
    where
        F: FnOnce(&mut CommandRecorder<'_>) -> Result<()>,
    {
        let command_buffer = self.command_buffer(image_index)?;
        let semaphore = self.semaphore(image_index)?;

        let mut recorder = CommandRecorder::new(&self.device, command_buffer);
        recorder.begin()?;
        if let Err(e) = record(&mut recorder) {
            // Leave the buffer executable so the next begin starts clean
            if let Err(end_error) = recorder.end() {
                log::warn!("Failed to close post-process command buffer: {}", end_error);
            }
            return Err(e);
        }
        recorder.end()?;

        self.device.submit(
            self.queue,
            &SubmitInfo {
                command_buffers: vec![command_buffer],
                wait_semaphores: wait_semaphores.to_vec(),
                signal_semaphores: vec![semaphore],
                fence: None,
            },
        )?;
        Ok(semaphore)
    }

    fn release(&mut self) {
        for semaphore in self.semaphores.drain(..) {
            self.device.destroy_semaphore(semaphore);
        }
        for command_buffer in self.command_buffers.drain(..) {
            self.device.free_command_buffer(command_buffer);
        }
    }
}

impl Drop for PostProcess {
    fn drop(&mut self) {
        self.release();
    }
}
