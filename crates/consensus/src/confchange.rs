pub mod cluster_changer;
