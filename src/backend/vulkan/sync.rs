// Synchronization primitives and query pools
//
// Fences, semaphores for GPU-CPU and GPU-GPU sync

use super::convert;
use super::device::LogicalDevice;
use crate::error::{Error, Result};
use crate::objects::{FenceCreateInfo, QueryCreateInfo, QueryKind, SemaphoreCreateInfo};
use ash::vk;

pub fn create_fence(device: &LogicalDevice, info: &FenceCreateInfo) -> Result<vk::Fence> {
    let flags = if info.signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };
    let fence_info = vk::FenceCreateInfo::builder().flags(flags);

    Ok(unsafe { device.device.create_fence(&fence_info, None) }?)
}

pub fn create_semaphore(device: &LogicalDevice, _info: &SemaphoreCreateInfo) -> Result<vk::Semaphore> {
    let semaphore_info = vk::SemaphoreCreateInfo::builder();

    Ok(unsafe { device.device.create_semaphore(&semaphore_info, None) }?)
}

pub fn create_query_pool(device: &LogicalDevice, info: &QueryCreateInfo) -> Result<vk::QueryPool> {
    let statistics = if info.kind == QueryKind::PipelineStatistics {
        if !device.features.pipeline_statistics {
            return Err(Error::Unsupported("pipeline statistics queries".into()));
        }
        vk::QueryPipelineStatisticFlags::INPUT_ASSEMBLY_VERTICES
            | vk::QueryPipelineStatisticFlags::INPUT_ASSEMBLY_PRIMITIVES
            | vk::QueryPipelineStatisticFlags::VERTEX_SHADER_INVOCATIONS
            | vk::QueryPipelineStatisticFlags::FRAGMENT_SHADER_INVOCATIONS
            | vk::QueryPipelineStatisticFlags::COMPUTE_SHADER_INVOCATIONS
    } else {
        vk::QueryPipelineStatisticFlags::empty()
    };

    let pool_info = vk::QueryPoolCreateInfo::builder()
        .query_type(convert::query_type(info.kind))
        .query_count(info.count)
        .pipeline_statistics(statistics);

    Ok(unsafe { device.device.create_query_pool(&pool_info, None) }?)
}

/// Block until `fence` is signaled or `timeout` nanoseconds pass.
pub fn wait_for_fence(device: &LogicalDevice, fence: vk::Fence, timeout: u64) -> Result<()> {
    unsafe { device.device.wait_for_fences(&[fence], true, timeout) }?;
    Ok(())
}

pub fn reset_fence(device: &LogicalDevice, fence: vk::Fence) -> Result<()> {
    unsafe { device.device.reset_fences(&[fence]) }?;
    Ok(())
}
