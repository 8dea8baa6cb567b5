/// Configuration options of the execution engine.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Whether pipelines that support parallel execution are executed by multiple worker threads.
    pub parallel_execution: bool,
    /// The number of worker threads. `0` means the number of threads is chosen by rayon.
    pub num_threads: usize,
    /// The maximum number of rows in a batch produced by a source of a pipeline.
    pub vector_size: usize,
    /// Whether the hash join filters rows of the probe side with a bloom filter.
    pub enable_bloom_filter: bool,
    /// The false positive rate of bloom filters.
    pub bloom_filter_fp_rate: f64,
    /// Whether the hash join prefetches hash table buckets before it probes them.
    pub enable_prefetch: bool,
    /// The number of rows whose buckets are prefetched at once.
    pub prefetch_vector_size: usize,
    /// The initial number of buckets of hash tables.
    pub hash_table_initial_size: usize,
}

impl ExecutionConfig {
    pub fn with_parallel_execution(mut self, parallel_execution: bool) -> Self {
        self.parallel_execution = parallel_execution;
        self
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn with_vector_size(mut self, vector_size: usize) -> Self {
        self.vector_size = vector_size;
        self
    }

    pub fn with_bloom_filter(mut self, enable_bloom_filter: bool) -> Self {
        self.enable_bloom_filter = enable_bloom_filter;
        self
    }

    pub fn with_bloom_filter_fp_rate(mut self, bloom_filter_fp_rate: f64) -> Self {
        self.bloom_filter_fp_rate = bloom_filter_fp_rate;
        self
    }

    pub fn with_prefetch(mut self, enable_prefetch: bool) -> Self {
        self.enable_prefetch = enable_prefetch;
        self
    }

    pub fn with_prefetch_vector_size(mut self, prefetch_vector_size: usize) -> Self {
        self.prefetch_vector_size = prefetch_vector_size;
        self
    }

    pub fn with_hash_table_initial_size(mut self, hash_table_initial_size: usize) -> Self {
        self.hash_table_initial_size = hash_table_initial_size;
        self
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            parallel_execution: false,
            num_threads: 0,
            vector_size: 1024,
            enable_bloom_filter: false,
            bloom_filter_fp_rate: 0.1,
            enable_prefetch: false,
            prefetch_vector_size: 10,
            hash_table_initial_size: 8 * 1024,
        }
    }
}
