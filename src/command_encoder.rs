/// Scoped passes: each pass ends when `function` returns.
pub trait CommandEncoderExt {
    /// Runs `function` inside a compute pass, wrapped in a debug group named
    /// after the pass.
    fn with_compute_pass<'pass, A>(
        &'pass mut self,
        label: &str,
        function: impl FnOnce(&mut wgpu::ComputePass<'pass>) -> A,
    ) -> A;

    fn with_render_pass<'pass, A>(
        &'pass mut self,
        descriptor: &wgpu::RenderPassDescriptor<'pass, '_>,
        function: impl FnOnce(&mut wgpu::RenderPass<'pass>) -> A,
    ) -> A;
}

impl CommandEncoderExt for wgpu::CommandEncoder {
    fn with_compute_pass<'pass, A>(
        &'pass mut self,
        label: &str,
        function: impl FnOnce(&mut wgpu::ComputePass<'pass>) -> A,
    ) -> A {
        let mut compute_pass = self.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
        });
        compute_pass.push_debug_group(label);
        let result = function(&mut compute_pass);
        compute_pass.pop_debug_group();
        result
    }

    fn with_render_pass<'pass, A>(
        &'pass mut self,
        descriptor: &wgpu::RenderPassDescriptor<'pass, '_>,
        function: impl FnOnce(&mut wgpu::RenderPass<'pass>) -> A,
    ) -> A {
        let mut render_pass = self.begin_render_pass(descriptor);
        function(&mut render_pass)
    }
}
