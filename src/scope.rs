/// Runs `function` with validation and out-of-memory errors captured, rather
/// than handed to the device's uncaptured error handler (which panics).
///
/// Returns the first captured error, validation errors taking precedence.
pub fn capture<A>(device: &wgpu::Device, function: impl FnOnce() -> A) -> (A, Option<wgpu::Error>) {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let result = function();

    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    (result, validation.or(out_of_memory))
}
