#![no_std]
#![no_main]

use user::*;

#[unsafe(no_mangle)]
fn main(_args: Args) {
    // fds 0/1/2 are already wired to the console by the kernel before this
    // binary is ever exec'd.
    loop {
        let Ok(pid) = fork() else {
            exit_with_msg("init: fork failed");
        };

        if pid == 0 {
            exec("/sh", &["sh"]);
            exit_with_msg("init: exec sh failed");
        }

        loop {
            // this call to wait() returns if the shell exits, or if a parentless process exits
            let wpid = wait(&mut 0);
            if let Ok(wpid) = wpid {
                if wpid == pid {
                    // shell exited; restart it
                    break;
                }
            } else {
                exit_with_msg("init: wait error");
            }
        }
    }
}
