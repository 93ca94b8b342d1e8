pub mod reconcile_task;
