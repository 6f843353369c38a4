#[cfg(test)]
mod util;


#[cfg(test)]
mod hack;



#[cfg(test)]
mod task;

#[cfg(test)]
mod verdict;

#[cfg(test)]
fn init() {
  let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
    .is_test(true)
    .try_init();
}
